use crate::config::LoaderConfig;
use anyhow::Context;
use clap::Args;
use std::{fs, path::PathBuf};
use texstream_dds::DdsContainer;
use texstream_utils::{ok, AnyResult};

#[derive(Args)]
pub struct InspectCommand {
    /// Path to the DDS file.
    pub path: PathBuf,
}

impl crate::Command for InspectCommand {
    fn run(self, _config: &LoaderConfig) -> AnyResult {
        let bytes = fs::read(&self.path)
            .with_context(|| format!("couldn't read {}", self.path.display()))?;
        let dds = texstream_dds::decode(&bytes)
            .with_context(|| format!("couldn't decode {}", self.path.display()))?;

        print!("{}", describe(&dds));
        ok()
    }
}

/// Formats the layout of a decoded file as a human readable table.
pub fn describe(dds: &DdsContainer) -> String {
    let mut out = format!(
        "{}x{}, {}, {} mip level(s), data at offset {}\n",
        dds.width,
        dds.height,
        dds.format,
        dds.mip_count,
        dds.data_offset()
    );
    if let Some(dimension) = dds.resource_dimension() {
        out += &format!(
            "DX10 header: {dimension:?}, array size {}\n",
            dds.array_size().unwrap_or(1)
        );
    }

    out += "mip     size    offset  row pitch  slice pitch\n";
    for view in dds.subresources() {
        out += &format!(
            "{:>3} {:>9} {:>9} {:>10} {:>12}\n",
            view.mip_level,
            format!("{}x{}", view.width, view.height),
            view.offset,
            view.row_pitch,
            view.slice_pitch
        );
    }

    if dds.trailing_bytes() > 0 {
        out += &format!("{} trailing byte(s) after the last level\n", dds.trailing_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use texstream_dds::{DdsHeader, DdsPixelFormat, DDS_MAGIC};
    use texstream_utils::packed::PackedData;

    #[test]
    pub fn layout_table() {
        let mut file = DDS_MAGIC.to_le_bytes().to_vec();
        file.extend(
            DdsHeader::new_2d(4, 2, 2, DdsPixelFormat::RGBA8)
                .to_packed_bytes()
                .unwrap(),
        );
        file.extend([0; 32 + 8 + 3]);

        let text = describe(&texstream_dds::decode(&file).unwrap());
        let lines: Vec<_> = text.lines().collect();

        assert!(lines[0].starts_with("4x2, "));
        assert!(lines[0].ends_with("2 mip level(s), data at offset 128"));
        assert_eq!(lines[2].split_whitespace().collect::<Vec<_>>(), ["0", "4x2", "128", "16", "32"]);
        assert_eq!(lines[3].split_whitespace().collect::<Vec<_>>(), ["1", "2x1", "160", "8", "8"]);
        assert_eq!(lines[4], "3 trailing byte(s) after the last level");
    }
}
