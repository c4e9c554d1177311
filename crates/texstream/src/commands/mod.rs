use crate::{
    config::{Backend, DeviceConfig},
    graphics::{
        soft::{SoftDevice, SoftDeviceOptions},
        Device, DeviceCapabilities,
    },
};
use log::*;
use std::sync::Arc;
use texstream_utils::AnyResult;

pub mod inspect;
pub mod read;
pub mod upload;

/// Creates the device selected in the configuration.
pub fn create_device(config: &DeviceConfig) -> AnyResult<Arc<dyn Device>> {
    let requested = DeviceCapabilities {
        direct_storage: config.direct_storage,
        bc_compression: config.bc_compression,
    };

    let device: Arc<dyn Device> = match config.backend {
        Backend::Soft => Arc::new(SoftDevice::new(SoftDeviceOptions {
            direct_storage: requested.direct_storage,
            bc_compression: requested.bc_compression,
            ..Default::default()
        })),
        #[cfg(feature = "wgpu-backend")]
        Backend::Wgpu => {
            use crate::graphics::wgpu_backend::{DeviceContext, WgpuDevice};
            Arc::new(WgpuDevice::new(DeviceContext::create_headless()?, requested))
        }
        #[cfg(not(feature = "wgpu-backend"))]
        Backend::Wgpu => anyhow::bail!("texstream was built without the `wgpu-backend` feature"),
    };

    info!(
        "Using the {:?} backend ({:?})",
        config.backend,
        device.capabilities()
    );
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn soft_devices_follow_the_configuration() {
        let device = create_device(&DeviceConfig {
            backend: Backend::Soft,
            direct_storage: false,
            bc_compression: true,
        })
        .unwrap();

        assert_eq!(
            device.capabilities(),
            DeviceCapabilities {
                direct_storage: false,
                bc_compression: true,
            }
        );
    }
}
