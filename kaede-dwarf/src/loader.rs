//! 実行ファイルとDWARFの読み込み機能

use crate::{NoDebugInfo, Result};
use object::{Object, ObjectSection};
use std::fs;
use std::path::Path;

/// 実行ファイルローダー
#[derive(Debug)]
pub struct ExeLoader {
    /// DWARFコンテキスト
    dwarf: gimli::Dwarf<gimli::EndianSlice<'static, gimli::RunTimeEndian>>,
}

impl ExeLoader {
    /// 実行ファイルからDWARF情報を読み込む
    ///
    /// コンテナ形式（ELF / Mach-O / PE）の判別はobjectクレートが行います。
    /// 解析できない場合、またはコンパイルユニットが1つも無い場合は
    /// `NoDebugInfo` を返します。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read executable {:?}: {}", path, e))?;

        // セクションスライスを'staticで保持するためBox::leakを使用する
        let file_data: &'static [u8] = Box::leak(file_data.into_boxed_slice());

        let object_file = match object::File::parse(file_data) {
            Ok(f) => f,
            Err(_) => {
                return Err(NoDebugInfo {
                    path: path.to_path_buf(),
                }
                .into())
            }
        };

        let endian = if object_file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        // DWARFセクションを読み込む（存在しないセクションは空スライス）
        let load_section = |id: gimli::SectionId| -> Result<gimli::EndianSlice<'static, gimli::RunTimeEndian>> {
            let data = object_file
                .section_by_name(id.name())
                .and_then(|section| section.data().ok())
                .unwrap_or(&[]);
            Ok(gimli::EndianSlice::new(data, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)
            .map_err(|e| anyhow::anyhow!("Failed to load DWARF sections: {}", e))?;

        // コンパイルユニットが無ければデバッグ情報無しとみなす
        let mut units = dwarf.units();
        if units
            .next()
            .map_err(|e| anyhow::anyhow!("Failed to read unit header: {}", e))?
            .is_none()
        {
            return Err(NoDebugInfo {
                path: path.to_path_buf(),
            }
            .into());
        }

        Ok(Self { dwarf })
    }

    /// DWARFコンテキストへの参照を取得する
    pub fn dwarf(&self) -> &gimli::Dwarf<gimli::EndianSlice<'static, gimli::RunTimeEndian>> {
        &self.dwarf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_non_executable_is_no_debug_info() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not an executable at all").unwrap();

        let err = ExeLoader::load(file.path()).unwrap_err();
        assert!(err.downcast_ref::<NoDebugInfo>().is_some());
    }
}
