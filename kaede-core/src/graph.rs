//! 導出インデックスとグラフ問い合わせ
//!
//! リンク後に一度だけ構築する型別ヒストグラムと2層構造の逆エッジ表、
//! およびそれらを使う参照元列挙・到達メモリ集計を提供します。

use std::collections::HashMap;
use std::collections::VecDeque;

use tracing::debug;

use crate::dump::{Dump, Edge, FrameId, ObjId, Object, TypeId};
use crate::error::UnknownObject;

/// 型別ヒストグラムのバケット
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// バケット内オブジェクトの合計バイト数
    pub bytes: u64,
    pub objects: Vec<ObjId>,
}

/// 導出インデックス
///
/// 逆エッジ表は2層構造です。最初に見つかった参照元は密配列ref1に、
/// 2つ目以降は疎なref2に入ります。入次数1のオブジェクトが大半を占める
/// ため、全体のサイズはオブジェクト数程度に収まります。
#[derive(Debug, Default)]
pub(crate) struct Indexes {
    /// 型IDごとのバケット（typesと同じ並び）
    pub by_type: Vec<Bucket>,
    /// 型不明オブジェクトのバケット
    pub untyped: Bucket,
    /// 最初の参照元。未参照はObjId::NONE
    pub ref1: Vec<ObjId>,
    /// 2つ目以降の参照元。大半のキーは存在しない
    pub ref2: HashMap<ObjId, Vec<ObjId>>,
}

impl Indexes {
    /// リンク済みオブジェクト列からインデックスを構築する
    pub(crate) fn build(objects: &[Object], num_types: usize) -> Self {
        let mut by_type = vec![Bucket::default(); num_types];
        let mut untyped = Bucket::default();
        for (i, o) in objects.iter().enumerate() {
            let id = ObjId(i as u32);
            let bucket = match o.typ {
                Some(t) => &mut by_type[t.index()],
                None => &mut untyped,
            };
            bucket.bytes += o.data.len() as u64;
            bucket.objects.push(id);
        }

        let mut ref1 = vec![ObjId::NONE; objects.len()];
        let mut ref2: HashMap<ObjId, Vec<ObjId>> = HashMap::new();
        for (i, o) in objects.iter().enumerate() {
            let src = ObjId(i as u32);
            for e in &o.edges {
                // 同一の参照元は宛先ごとに一度だけ記録する。参照元は
                // ID順に処理されるため、重複は末尾との比較で検出できる。
                if ref1[e.to.index()] == ObjId::NONE {
                    ref1[e.to.index()] = src;
                } else if ref1[e.to.index()] != src {
                    let v = ref2.entry(e.to).or_default();
                    if v.last() != Some(&src) {
                        v.push(src);
                    }
                }
            }
        }

        debug!(
            objects = objects.len(),
            multi_referenced = ref2.len(),
            "derived indexes built"
        );
        Self {
            by_type,
            untyped,
            ref1,
            ref2,
        }
    }
}

/// オブジェクトへの参照元
#[derive(Debug, Clone)]
pub enum Referrer {
    /// 別のヒープオブジェクトからの参照
    Object { from: ObjId, edge: Edge },
    /// グローバル変数からの参照
    Global { name: String },
    /// スタックフレームのローカル変数からの参照
    Frame { frame: FrameId },
    /// その他のルートからの参照
    Other { description: String },
}

impl Dump {
    /// 型IDごとのヒストグラムバケットを取得する（typesと同じ並び）
    pub fn histogram(&self) -> &[Bucket] {
        &self.idx.by_type
    }

    /// 型不明オブジェクトのバケットを取得する
    pub fn untyped_bucket(&self) -> &Bucket {
        &self.idx.untyped
    }

    /// 型のバケットを取得する
    pub fn bucket(&self, t: TypeId) -> &Bucket {
        &self.idx.by_type[t.index()]
    }

    /// 最初に発見された参照元を取得する（未参照ならNone）
    pub fn first_referrer(&self, id: ObjId) -> Result<Option<ObjId>, UnknownObject> {
        let r = *self
            .idx
            .ref1
            .get(id.index())
            .ok_or(UnknownObject(id))?;
        Ok(if r == ObjId::NONE { None } else { Some(r) })
    }

    /// 2つ目以降の参照元を取得する
    pub fn extra_referrers(&self, id: ObjId) -> Result<&[ObjId], UnknownObject> {
        if id.index() >= self.objects.len() {
            return Err(UnknownObject(id));
        }
        Ok(self.idx.ref2.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// 2つ以上のオブジェクトから参照されているオブジェクトの数
    pub fn multi_referenced_count(&self) -> usize {
        self.idx.ref2.len()
    }

    /// オブジェクトの参照元をすべて列挙する
    ///
    /// ヒープオブジェクトからの参照（ref1、続いてref2の各参照元について
    /// 該当エッジを復元）に続けて、グローバル・スタックフレーム・
    /// その他ルート由来の参照を返します。
    pub fn referrers(&self, id: ObjId) -> Result<Vec<Referrer>, UnknownObject> {
        if id.index() >= self.objects.len() {
            return Err(UnknownObject(id));
        }

        let mut out = Vec::new();
        let push_object_edges = |out: &mut Vec<Referrer>, src: ObjId| {
            for e in &self.objects[src.index()].edges {
                if e.to == id {
                    out.push(Referrer::Object {
                        from: src,
                        edge: e.clone(),
                    });
                }
            }
        };

        let first = self.idx.ref1[id.index()];
        if first != ObjId::NONE {
            push_object_edges(&mut out, first);
        }
        if let Some(rest) = self.idx.ref2.get(&id) {
            for &src in rest {
                push_object_edges(&mut out, src);
            }
        }

        for r in &self.data_roots {
            if let Some(e) = &r.edge {
                if e.to == id {
                    out.push(Referrer::Global {
                        name: r.name.clone(),
                    });
                }
            }
        }
        for (i, f) in self.frames.iter().enumerate() {
            for e in &f.edges {
                if e.to == id {
                    out.push(Referrer::Frame {
                        frame: FrameId(i as u32),
                    });
                }
            }
        }
        for r in &self.other_roots {
            if let Some(e) = &r.edge {
                if e.to == id {
                    out.push(Referrer::Other {
                        description: r.description.clone(),
                    });
                }
            }
        }

        Ok(out)
    }

    /// オブジェクトから到達可能なメモリの合計バイト数を求める
    ///
    /// 出力エッジに沿った幅優先探索で、訪問済み集合により重複を除いて
    /// sizeを合計します。コストは1回あたりO(V+E)です。
    pub fn reachable(&self, id: ObjId) -> Result<u64, UnknownObject> {
        if id.index() >= self.objects.len() {
            return Err(UnknownObject(id));
        }

        let mut visited = vec![false; self.objects.len()];
        let mut queue = VecDeque::new();
        visited[id.index()] = true;
        queue.push_back(id);

        let mut total = 0u64;
        while let Some(x) = queue.pop_front() {
            let o = &self.objects[x.index()];
            total += o.data.len() as u64;
            for e in &o.edges {
                if !visited[e.to.index()] {
                    visited[e.to.index()] = true;
                    queue.push_back(e.to);
                }
            }
        }
        Ok(total)
    }
}
