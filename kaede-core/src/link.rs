//! アドレス解決（リンク）
//!
//! 生レコード群の相互参照アドレスを、ID参照を持つリンク済み実体へ
//! 解決します。処理は以下の順で行います。
//!
//! 1. オブジェクト→型
//! 2. フレーム→親フレーム（スタック底の解決失敗は正常）
//! 3. ゴルーチン→フレーム（相互リンク）とコンテキスト
//! 4. ルート→オブジェクト（解決失敗は黙って省略）
//! 5. オブジェクト間エッジ（型のフィールド記述子に従うペイロード走査）
//! 6. ファイナライザのエッジ

use std::collections::HashMap;

use tracing::{debug, info};

use kaede_dwarf::GlobalTable;
use kaede_format::{
    Field, FieldKind, FormatError, ObjectKind, RawDump, RawGoRoutine, RawStackFrame, WordReader,
};

use crate::dump::{
    find_containing, DataRoot, Dump, Edge, FrameId, GoIdx, GoRoutine, GoStatus, Object, ObjId,
    OtherRoot, StackFrame, StackRoot, Type, TypeId,
};
use crate::error::LinkError;
use crate::graph::Indexes;
use crate::Result;

/// 生ダンプをリンクし、導出インデックスまで構築した Dump を返す
pub fn link(raw: RawDump, globals: &GlobalTable) -> Result<Dump> {
    let params = raw.params.clone().ok_or_else(|| {
        FormatError::UnsupportedParameters("dump stream carries no params record".into())
    })?;
    let words = WordReader::new(params.order, params.ptr_size)?;

    // リンク用の各アドレス索引を構築する
    let (types, type_ids) = dedup_types(raw.types);
    let itab_flags: HashMap<u64, bool> = raw.itabs.iter().map(|t| (t.addr, t.ptr)).collect();
    let frame_ids: HashMap<(u64, u64), FrameId> = raw
        .frames
        .iter()
        .enumerate()
        .map(|(i, f)| ((f.addr, f.depth), FrameId(i as u32)))
        .collect();

    // フェーズ1: オブジェクト→型
    let mut objects = Vec::with_capacity(raw.objects.len());
    for o in raw.objects {
        let typ = if o.type_addr == 0 {
            // 型アドレス0は正常（ポインタフィールド無しとして扱う）
            None
        } else {
            Some(
                *type_ids
                    .get(&o.type_addr)
                    .ok_or(LinkError::MissingType(o.type_addr))?,
            )
        };
        objects.push(Object {
            addr: o.addr,
            kind: o.kind,
            typ,
            data: o.data,
            edges: Vec::new(),
        });
    }

    // アドレス昇順のヒープ索引
    let mut heap: Vec<ObjId> = (0..objects.len()).map(|i| ObjId(i as u32)).collect();
    heap.sort_by_key(|id| objects[id.index()].addr);

    // フェーズ2: フレーム→親フレーム
    let mut frames = link_frames(&raw.frames, &frame_ids);

    // フェーズ3: ゴルーチン→フレーム
    let goroutines = link_goroutines(&raw.goroutines, &frame_ids, &mut frames, &objects, &heap)?;

    // フェーズ4: ルート→オブジェクト
    let mut stack_roots = Vec::with_capacity(raw.stack_roots.len());
    for r in &raw.stack_roots {
        let frame = frame_ids.get(&(r.frame_addr, r.depth)).copied();
        let edge = find_containing(&objects, &heap, r.to_addr).map(|to| Edge {
            to,
            from_offset: r.from_addr.wrapping_sub(r.frame_addr),
            to_offset: r.to_addr - objects[to.index()].addr,
            field_name: None,
        });
        if let (Some(f), Some(e)) = (frame, &edge) {
            frames[f.index()].edges.push(e.clone());
        }
        stack_roots.push(StackRoot { frame, edge });
    }

    let mut data_roots = Vec::with_capacity(raw.data_roots.len());
    for r in &raw.data_roots {
        let g = globals.find(r.from_addr);
        let edge = find_containing(&objects, &heap, r.to_addr).map(|to| Edge {
            to,
            from_offset: r.from_addr - g.addr,
            to_offset: r.to_addr - objects[to.index()].addr,
            field_name: Some(g.name.clone()),
        });
        data_roots.push(DataRoot { name: g.name, edge });
    }

    let mut other_roots = Vec::with_capacity(raw.other_roots.len());
    for r in &raw.other_roots {
        let edge = find_containing(&objects, &heap, r.to_addr).map(|to| Edge {
            to,
            from_offset: 0,
            to_offset: r.to_addr - objects[to.index()].addr,
            field_name: None,
        });
        other_roots.push(OtherRoot {
            description: r.description.clone(),
            edge,
        });
    }

    // フェーズ5: オブジェクト間エッジ
    let scanner = FieldScanner {
        words,
        h_chan_size: params.h_chan_size,
        types: &types,
        type_ids: &type_ids,
        itab_flags: &itab_flags,
    };
    let mut all_edges: Vec<Vec<Edge>> = Vec::with_capacity(objects.len());
    for o in &objects {
        all_edges.push(scanner.scan_object(o, &objects, &heap)?);
    }
    for (o, edges) in objects.iter_mut().zip(all_edges) {
        o.edges = edges;
    }

    // フェーズ6: ファイナライザのエッジ
    let mut finalizer_edges: Vec<(ObjId, Edge)> = Vec::new();
    for f in &raw.finalizers {
        let x = find_containing(&objects, &heap, f.obj);
        for addr in [f.fn_addr, f.fint, f.ot] {
            let y = find_containing(&objects, &heap, addr);
            // 参照元・参照先の両方が解決できた場合のみ記録する
            if let (Some(x), Some(y)) = (x, y) {
                // NOTE: エッジの宛先が解決先yではなくファイナライザ対象x
                // 自身を指している。従来の閲覧結果と互換にするため現状を
                // 維持している。
                // TODO: 宛先をyに改めるべきか、実ダンプで挙動を確認する
                finalizer_edges.push((
                    x,
                    Edge {
                        to: x,
                        from_offset: 0,
                        to_offset: addr - objects[y.index()].addr,
                        field_name: None,
                    },
                ));
            }
        }
    }
    for (src, e) in finalizer_edges {
        objects[src.index()].edges.push(e);
    }

    let idx = Indexes::build(&objects, types.len());

    info!(
        objects = objects.len(),
        types = types.len(),
        goroutines = goroutines.len(),
        frames = frames.len(),
        "dump linked"
    );

    Ok(Dump {
        params,
        mem_stats: raw.mem_stats,
        types,
        objects,
        frames,
        goroutines,
        stack_roots,
        data_roots,
        other_roots,
        finalizers: raw.finalizers,
        itabs: raw.itabs,
        os_threads: raw.os_threads,
        heap,
        idx,
        words,
    })
}

/// 型レコードをアドレスで重複排除しつつIDを割り当てる
///
/// ダンプには同一アドレスの型レコードが複数含まれることがある。
/// 後のレコードが同じIDの内容を上書きする。
fn dedup_types(raw: Vec<kaede_format::RawType>) -> (Vec<Type>, HashMap<u64, TypeId>) {
    use std::collections::hash_map::Entry;

    let mut types: Vec<Type> = Vec::with_capacity(raw.len());
    let mut ids: HashMap<u64, TypeId> = HashMap::with_capacity(raw.len());
    for t in raw {
        let linked = Type {
            addr: t.addr,
            name: t.name,
            size: t.size,
            eface_ptr: t.eface_ptr,
            fields: t.fields,
        };
        match ids.entry(linked.addr) {
            Entry::Occupied(e) => {
                let id = *e.get();
                types[id.index()] = linked;
            }
            Entry::Vacant(v) => {
                v.insert(TypeId(types.len() as u32));
                types.push(linked);
            }
        }
    }
    (types, ids)
}

/// フレーム列をリンクする（親フレーム解決）
fn link_frames(
    raw: &[RawStackFrame],
    frame_ids: &HashMap<(u64, u64), FrameId>,
) -> Vec<StackFrame> {
    raw.iter()
        .map(|f| StackFrame {
            addr: f.addr,
            depth: f.depth,
            name: f.name.clone(),
            entry: f.entry,
            pc: f.pc,
            // スタック底のフレーム（通常はランタイムの脱出トランポリン）は
            // ここで解決に失敗してNoneになる。エラーではない。
            parent: frame_ids.get(&(f.parent_addr, f.depth + 1)).copied(),
            goroutine: None,
            edges: Vec::new(),
        })
        .collect()
}

/// ゴルーチンをリンクする
///
/// スタックトップのフレームを解決し（失敗は致命的）、親チェーンを辿って
/// 各フレームにゴルーチンへの逆参照を設定します。
fn link_goroutines(
    raw: &[RawGoRoutine],
    frame_ids: &HashMap<(u64, u64), FrameId>,
    frames: &mut [StackFrame],
    objects: &[Object],
    heap: &[ObjId],
) -> Result<Vec<GoRoutine>> {
    let mut goroutines = Vec::with_capacity(raw.len());
    for (gi, g) in raw.iter().enumerate() {
        let status = GoStatus::from_code(g.addr, g.status)?;
        let tos = *frame_ids
            .get(&(g.tos_addr, 0))
            .ok_or(LinkError::OrphanGoroutine(g.addr))?;

        let mut cursor = Some(tos);
        while let Some(f) = cursor {
            frames[f.index()].goroutine = Some(GoIdx(gi as u32));
            cursor = frames[f.index()].parent;
        }

        goroutines.push(GoRoutine {
            addr: g.addr,
            tos,
            status,
            wait_reason: g.wait_reason.clone(),
            ctxt: find_containing(objects, heap, g.ctxt_addr),
            goid: g.goid,
            gopc: g.gopc,
            is_system: g.is_system,
            is_background: g.is_background,
            wait_since: g.wait_since,
            m_addr: g.m_addr,
        });
    }
    Ok(goroutines)
}

/// 型のフィールド記述子に従ってペイロードを走査し、エッジを収集する
struct FieldScanner<'a> {
    words: WordReader,
    h_chan_size: u64,
    types: &'a [Type],
    type_ids: &'a HashMap<u64, TypeId>,
    itab_flags: &'a HashMap<u64, bool>,
}

impl FieldScanner<'_> {
    /// 1オブジェクト分のエッジを計算する
    ///
    /// 走査回数はオブジェクト種別で決まる。通常オブジェクトはオフセット0の
    /// 1回、配列は要素サイズ刻み、チャネルはヘッダ領域を飛ばして要素サイズ
    /// 刻み。エッジはfrom_offset昇順に並ぶ。
    fn scan_object(&self, obj: &Object, objects: &[Object], heap: &[ObjId]) -> Result<Vec<Edge>> {
        let Some(tid) = obj.typ else {
            return Ok(Vec::new());
        };
        let t = &self.types[tid.index()];
        let len = obj.data.len() as u64;

        let mut edges = Vec::new();
        match obj.kind {
            ObjectKind::Plain => {
                self.scan_fields(obj, objects, heap, &t.fields, 0, &mut edges)?;
            }
            ObjectKind::Array => {
                if t.size > 0 {
                    let mut base = 0u64;
                    while base.checked_add(t.size).map_or(false, |end| end <= len) {
                        self.scan_fields(obj, objects, heap, &t.fields, base, &mut edges)?;
                        base += t.size;
                    }
                }
            }
            ObjectKind::Chan => {
                // 先頭h_chan_sizeバイトはチャネルヘッダで、ユーザーフィールド
                // を含まないため走査しない
                if t.size > 0 {
                    let mut base = self.h_chan_size;
                    while base.checked_add(t.size).map_or(false, |end| end <= len) {
                        self.scan_fields(obj, objects, heap, &t.fields, base, &mut edges)?;
                        base += t.size;
                    }
                }
            }
            // 未知の種別は走査パスを持たない
            ObjectKind::Unknown(_) => {}
        }
        Ok(edges)
    }

    /// 1パス分のフィールド走査
    fn scan_fields(
        &self,
        obj: &Object,
        objects: &[Object],
        heap: &[ObjId],
        fields: &[Field],
        base: u64,
        edges: &mut Vec<Edge>,
    ) -> Result<()> {
        let ptr_size = self.words.ptr_size();
        for f in fields {
            let off = base.saturating_add(f.offset);
            match f.kind {
                // 文字列・スライスはヘッダ先頭のポインタ成分だけを見る。
                // 長さや容量はペイロードに残っており、表示時に読み出せる。
                FieldKind::Ptr | FieldKind::String | FieldKind::Slice => {
                    self.try_edge(obj, objects, heap, off, edges)?;
                }
                FieldKind::Eface => {
                    let type_word = self.words.read_ptr(payload_at(&obj.data, off)?)?;
                    if type_word != 0 {
                        let tid = self
                            .type_ids
                            .get(&type_word)
                            .ok_or(LinkError::MissingEfaceType(type_word))?;
                        if self.types[tid.index()].eface_ptr {
                            self.try_edge(obj, objects, heap, off + ptr_size, edges)?;
                        }
                    }
                }
                FieldKind::Iface => {
                    let itab_word = self.words.read_ptr(payload_at(&obj.data, off)?)?;
                    if itab_word != 0 {
                        let is_ptr = self
                            .itab_flags
                            .get(&itab_word)
                            .ok_or(LinkError::MissingItab(itab_word))?;
                        if *is_ptr {
                            self.try_edge(obj, objects, heap, off + ptr_size, edges)?;
                        }
                    }
                }
                // 未知の種別は復号もエッジ生成もしない
                FieldKind::Unknown(_) => {}
            }
        }
        Ok(())
    }

    /// オフセット位置のポインタがヒープ内を指していればエッジを追加する
    fn try_edge(
        &self,
        obj: &Object,
        objects: &[Object],
        heap: &[ObjId],
        off: u64,
        edges: &mut Vec<Edge>,
    ) -> Result<()> {
        let p = self.words.read_ptr(payload_at(&obj.data, off)?)?;
        if let Some(to) = find_containing(objects, heap, p) {
            edges.push(Edge {
                to,
                from_offset: off,
                to_offset: p - objects[to.index()].addr,
                field_name: None,
            });
        } else {
            debug!(addr = obj.addr, offset = off, ptr = p, "pointer outside heap");
        }
        Ok(())
    }
}

/// ペイロードのオフセット位置以降のスライスを得る。範囲外はMalformed。
fn payload_at(data: &[u8], off: u64) -> Result<&[u8]> {
    data.get(off as usize..).ok_or_else(|| {
        FormatError::Malformed(format!(
            "field offset {} past payload end ({} bytes)",
            off,
            data.len()
        ))
        .into()
    })
}
