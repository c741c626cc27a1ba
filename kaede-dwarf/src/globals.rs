//! グローバル変数表
//!
//! DWARFの変数定義エントリから、絶対アドレスを持つグローバル変数の
//! (名前, アドレス) 表を構築します。データルートの命名に使用されます。

use crate::loader::ExeLoader;
use crate::Result;
use kaede_format::WordReader;
use tracing::debug;

/// ルート命名に使えるグローバルが見つからない場合の表示名
const UNKNOWN_GLOBAL: &str = "unknown global";

/// グローバル変数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    pub addr: u64,
}

/// アドレスソート済みのグローバル変数表
#[derive(Debug, Default)]
pub struct GlobalTable {
    /// アドレス昇順
    entries: Vec<Global>,
}

impl GlobalTable {
    /// 空の表を作成する
    ///
    /// 実行ファイルが与えられなかった場合に使用します。すべての検索が
    /// 「unknown global」に解決されます。
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// エントリ列から表を作成する（アドレスでソートされる）
    pub fn from_entries(mut entries: Vec<Global>) -> Self {
        entries.sort_by_key(|g| g.addr);
        Self { entries }
    }

    /// 実行ファイルのDWARF情報から表を構築する
    ///
    /// 選択するのは、ロケーション式が「DW_OP_addr + ネイティブ幅アドレス
    /// リテラル」の1命令だけで構成される変数定義エントリのみです。
    /// アドレスリテラルはダンプ元のバイトオーダー・ポインタ幅で
    /// 格納されているため、ダンプのWordReaderで復号します。
    pub fn from_exe(loader: &ExeLoader, words: &WordReader) -> Result<Self> {
        let dwarf = loader.dwarf();
        let expr_len = 1 + words.ptr_size() as usize;
        let mut entries = Vec::new();

        let mut headers = dwarf.units();
        while let Some(header) = headers.next()? {
            let unit = dwarf.unit(header)?;
            let mut cursor = unit.entries();
            while let Some((_, entry)) = cursor.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_variable {
                    continue;
                }

                let name = match entry.attr_value(gimli::DW_AT_name)? {
                    Some(value) => dwarf
                        .attr_string(&unit, value)?
                        .to_string_lossy()
                        .into_owned(),
                    None => continue,
                };

                let expr = match entry.attr_value(gimli::DW_AT_location)? {
                    Some(gimli::AttributeValue::Exprloc(expr)) => expr,
                    _ => continue,
                };
                let bytes = expr.0.slice();
                if bytes.len() != expr_len || bytes[0] != gimli::constants::DW_OP_addr.0 {
                    continue;
                }

                let addr = words.read_ptr(&bytes[1..])?;
                entries.push(Global { name, addr });
            }
        }

        debug!(globals = entries.len(), "global variable table built");
        Ok(Self::from_entries(entries))
    }

    /// アドレスpを含むグローバルを検索する
    ///
    /// p以下で最大のアドレスを持つエントリを返します。該当が無い場合は
    /// 「unknown global」（アドレス0）を返します。
    pub fn find(&self, p: u64) -> Global {
        let idx = self.entries.partition_point(|g| g.addr <= p);
        if idx == 0 {
            return Global {
                name: UNKNOWN_GLOBAL.to_string(),
                addr: 0,
            };
        }
        self.entries[idx - 1].clone()
    }

    /// すべてのエントリを取得する（アドレス昇順）
    pub fn all(&self) -> &[Global] {
        &self.entries
    }
}
