//! ダンプ読み込みのエントリポイント
//!
//! 読み取り・グローバル解決・リンク・インデックス構築を順に実行します。
//! 構築は単一スレッドで逐次的に行われ、返されたDumpは不変です。

use std::path::Path;

use tracing::{info, warn};

use kaede_dwarf::{ExeLoader, GlobalTable, NoDebugInfo};
use kaede_format::{DumpReader, FormatError, WordReader};

use crate::dump::Dump;
use crate::link;
use crate::Result;

/// 読み込みの設定
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// 実行ファイルにデバッグ情報が無い場合、エラーにせず全グローバルを
    /// 「unknown global」として続行する
    pub anonymous_globals: bool,
}

/// ダンプファイルと実行ファイルを読み込み、リンク済みDumpを返す
///
/// `exe_path` がNoneの場合、グローバル名の解決は行わずすべて匿名になります。
pub fn load<P: AsRef<Path>>(dump_path: P, exe_path: Option<P>) -> Result<Dump> {
    load_with_options(dump_path, exe_path, LoadOptions::default())
}

/// 設定を指定してダンプを読み込む
pub fn load_with_options<P: AsRef<Path>>(
    dump_path: P,
    exe_path: Option<P>,
    opts: LoadOptions,
) -> Result<Dump> {
    let dump_path = dump_path.as_ref();
    info!(path = %dump_path.display(), "reading heap dump");
    let raw = DumpReader::read_path(dump_path)?;

    let globals = match &exe_path {
        None => GlobalTable::anonymous(),
        Some(p) => {
            let params = raw.params.as_ref().ok_or_else(|| {
                FormatError::UnsupportedParameters("dump stream carries no params record".into())
            })?;
            let words = WordReader::new(params.order, params.ptr_size)?;
            match resolve_globals(p.as_ref(), &words) {
                Ok(g) => g,
                Err(e) if opts.anonymous_globals && e.downcast_ref::<NoDebugInfo>().is_some() => {
                    warn!(
                        exe = %p.as_ref().display(),
                        "no debug info; global roots will be anonymous"
                    );
                    GlobalTable::anonymous()
                }
                Err(e) => return Err(e),
            }
        }
    };

    let dump = link::link(raw, &globals)?;
    info!(
        objects = dump.num_objects(),
        types = dump.types.len(),
        "heap dump ready"
    );
    Ok(dump)
}

/// 実行ファイルからグローバル変数表を構築する
fn resolve_globals(exe_path: &Path, words: &WordReader) -> Result<GlobalTable> {
    info!(path = %exe_path.display(), "resolving globals from executable");
    let loader = ExeLoader::load(exe_path)?;
    GlobalTable::from_exe(&loader, words)
}
