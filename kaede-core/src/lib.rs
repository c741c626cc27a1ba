//! Kaede ヒープダンプ解析のコア機能
//!
//! このクレートは、読み取った生レコード群のアドレス解決（リンク）、
//! 型付きオブジェクトグラフの構築、導出インデックスと問い合わせ機能を
//! 提供します。HTTPサーバ等には依存せず、`load` だけで完結します。

pub mod dump;
pub mod error;
pub mod graph;
pub mod link;
pub mod load;

pub use dump::{
    DataRoot, Dump, Edge, FrameId, GoIdx, GoRoutine, GoStatus, Object, ObjId, OtherRoot,
    StackFrame, StackRoot, Type, TypeId,
};
pub use error::{LinkError, UnknownObject};
pub use graph::{Bucket, Referrer};
pub use load::{load, load_with_options, LoadOptions};

// 他のクレートから使用するために再エクスポート
pub use kaede_format::{ByteOrder, Field, FieldKind, MemStats, ObjectKind, Params, WordReader};

/// ダンプ解析の結果型
pub type Result<T> = anyhow::Result<T>;
