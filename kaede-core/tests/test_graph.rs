//! 導出インデックスと問い合わせの結合テスト

mod common;

use common::{le8, DumpBuilder};
use kaede_core::{ObjId, Referrer, TypeId};
use kaede_dwarf::{Global, GlobalTable};

#[test]
fn test_single_object_histogram() {
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0]));
    let d = b.link().unwrap();

    assert_eq!(d.num_objects(), 1);
    assert!(d.edges(ObjId(0)).unwrap().is_empty());

    let bucket = d.bucket(TypeId(0));
    assert_eq!(bucket.objects, vec![ObjId(0)]);
    assert_eq!(bucket.bytes, 8);
    assert!(d.untyped_bucket().objects.is_empty());
}

#[test]
fn test_histogram_groups_by_type() {
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.A", false, &[])
        .type_rec(0x8100, 16, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0]))
        .object(0x2000, 0x8000, 0, &le8(&[0]))
        .object(0x3000, 0x8100, 0, &le8(&[0, 0]))
        .object(0x4000, 0, 0, &le8(&[0]));
    let d = b.link().unwrap();

    let a = d.bucket(TypeId(0));
    assert_eq!(a.objects.len(), 2);
    assert_eq!(a.bytes, 16);
    let bb = d.bucket(TypeId(1));
    assert_eq!(bb.objects, vec![ObjId(2)]);
    assert_eq!(bb.bytes, 16);
    // 型不明オブジェクトは専用バケットに入る
    assert_eq!(d.untyped_bucket().objects, vec![ObjId(3)]);
}

#[test]
fn test_reverse_index_density() {
    // 1000個のオブジェクトがすべてオブジェクト#0を指す
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.B", false, &[])
        .type_rec(0x8100, 8, "*main.B", false, &[(0, 0)])
        .object(0x1000, 0x8000, 0, &le8(&[0]));
    for i in 0..1000u64 {
        b.object(0x2000 + i * 8, 0x8100, 0, &le8(&[0x1000]));
    }
    let d = b.link().unwrap();

    assert_eq!(d.num_objects(), 1001);

    // 最初の参照元が1つ、残り999はオーバーフロー側に入る
    let first = d.first_referrer(ObjId(0)).unwrap().unwrap();
    let extra = d.extra_referrers(ObjId(0)).unwrap();
    assert_eq!(extra.len(), 999);
    assert!(!extra.contains(&first));

    let mut all: Vec<ObjId> = extra.to_vec();
    all.push(first);
    all.sort();
    let expected: Vec<ObjId> = (1..=1000).map(|i| ObjId(i as u32)).collect();
    assert_eq!(all, expected);

    // 他のオブジェクトは誰からも参照されない
    for i in 1..=1000u32 {
        assert!(d.first_referrer(ObjId(i)).unwrap().is_none());
        assert!(d.extra_referrers(ObjId(i)).unwrap().is_empty());
    }
    // オーバーフロー側に入るのはオブジェクト#0だけ
    assert_eq!(d.multi_referenced_count(), 1);

    assert_eq!(d.referrers(ObjId(0)).unwrap().len(), 1000);
}

#[test]
fn test_reverse_index_completeness() {
    // すべてのエッジ (s→d) について、sがref1[d]またはref2[d]に現れる
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 24, "main.Node", false, &[(0, 0), (0, 8), (0, 16)])
        .object(0x1000, 0x8000, 0, &le8(&[0x2000, 0x3000, 0]))
        .object(0x2000, 0x8000, 0, &le8(&[0x3000, 0, 0]))
        .object(0x3000, 0x8000, 0, &le8(&[0x1000, 0x2000, 0]));
    let d = b.link().unwrap();

    for src in 0..d.num_objects() as u32 {
        for e in d.edges(ObjId(src)).unwrap() {
            let first = d.first_referrer(e.to).unwrap();
            let extra = d.extra_referrers(e.to).unwrap();
            assert!(
                first == Some(ObjId(src)) || extra.contains(&ObjId(src)),
                "edge {}->{} missing from reverse index",
                src,
                e.to
            );
        }
    }

    // 入力エッジのあるオブジェクトのref1は必ず埋まっている
    for id in 0..d.num_objects() as u32 {
        let has_inbound = (0..d.num_objects() as u32)
            .any(|s| d.edges(ObjId(s)).unwrap().iter().any(|e| e.to == ObjId(id)));
        if has_inbound {
            assert!(d.first_referrer(ObjId(id)).unwrap().is_some());
        }
    }
}

#[test]
fn test_reverse_index_minimality() {
    // 同一参照元から同一宛先への複数エッジは逆引き表には一度しか現れない
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 16, "main.Pair", false, &[(0, 0), (0, 8)])
        .type_rec(0x8100, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0x2000, 0x2004]))
        .object(0x2000, 0x8100, 0, &le8(&[0]));
    let d = b.link().unwrap();

    assert_eq!(d.edges(ObjId(0)).unwrap().len(), 2);
    assert_eq!(d.first_referrer(ObjId(1)).unwrap(), Some(ObjId(0)));
    // ref1に入った参照元はref2に重複して現れない
    assert!(d.extra_referrers(ObjId(1)).unwrap().is_empty());

    // 参照元の列挙は2本のエッジ両方を復元する
    let referrers = d.referrers(ObjId(1)).unwrap();
    assert_eq!(referrers.len(), 2);
    let offsets: Vec<u64> = referrers
        .iter()
        .map(|r| match r {
            Referrer::Object { edge, .. } => edge.from_offset,
            other => panic!("unexpected referrer {:?}", other),
        })
        .collect();
    assert_eq!(offsets, vec![0, 8]);
}

#[test]
fn test_reachable_chain_and_cycle() {
    // A→B→C の連鎖
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "*main.B", false, &[(0, 0)])
        .type_rec(0x8100, 8, "main.C", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0x2000]))
        .object(0x2000, 0x8000, 0, &le8(&[0x3000]))
        .object(0x3000, 0x8100, 0, &le8(&[0]));
    let d = b.link().unwrap();

    assert_eq!(d.reachable(ObjId(0)).unwrap(), 24);
    assert_eq!(d.reachable(ObjId(1)).unwrap(), 16);
    assert_eq!(d.reachable(ObjId(2)).unwrap(), 8);

    // 循環があっても二重に数えない
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "*main.T", false, &[(0, 0)])
        .object(0x1000, 0x8000, 0, &le8(&[0x2000]))
        .object(0x2000, 0x8000, 0, &le8(&[0x1000]));
    let d = b.link().unwrap();
    assert_eq!(d.reachable(ObjId(0)).unwrap(), 16);
    assert_eq!(d.reachable(ObjId(1)).unwrap(), 16);
}

#[test]
fn test_reachable_is_at_least_own_size() {
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0, 0, 0]));
    let d = b.link().unwrap();

    assert!(d.reachable(ObjId(0)).unwrap() >= d.size(ObjId(0)).unwrap());
}

#[test]
fn test_reachable_monotone_under_added_edge() {
    // エッジを増やしても到達量は減らない
    let mut base = DumpBuilder::new();
    base.params_le8()
        .type_rec(0x8000, 16, "main.Pair", false, &[(0, 0), (0, 8)])
        .type_rec(0x8100, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0x2000, 0]))
        .object(0x2000, 0x8100, 0, &le8(&[0]))
        .object(0x3000, 0x8100, 0, &le8(&[0]));
    let before = base.link().unwrap();

    let mut extended = DumpBuilder::new();
    extended
        .params_le8()
        .type_rec(0x8000, 16, "main.Pair", false, &[(0, 0), (0, 8)])
        .type_rec(0x8100, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0x2000, 0x3000]))
        .object(0x2000, 0x8100, 0, &le8(&[0]))
        .object(0x3000, 0x8100, 0, &le8(&[0]));
    let after = extended.link().unwrap();

    for id in 0..3u32 {
        assert!(
            after.reachable(ObjId(id)).unwrap() >= before.reachable(ObjId(id)).unwrap(),
            "object {}",
            id
        );
    }
}

#[test]
fn test_referrers_include_roots() {
    let globals = GlobalTable::from_entries(vec![Global {
        name: "main.registry".into(),
        addr: 0x500000,
    }]);

    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.B", false, &[])
        .object(0x2000, 0x8000, 0, &le8(&[0]))
        .frame(0x7000, 0, 0, "main.worker")
        .goroutine(0xc000, 0x7000, 1, "")
        .stack_root(0x7010, 0x2000, 0x7000, 0)
        .data_root(0x500008, 0x2000)
        .other_root("panic argument", 0x2000);
    let d = b.link_with(&globals).unwrap();

    let referrers = d.referrers(ObjId(0)).unwrap();
    assert_eq!(referrers.len(), 3);
    assert!(referrers.iter().any(
        |r| matches!(r, Referrer::Global { name } if name == "main.registry")
    ));
    assert!(referrers
        .iter()
        .any(|r| matches!(r, Referrer::Frame { frame } if d.frames[frame.index()].name == "main.worker")));
    assert!(referrers.iter().any(
        |r| matches!(r, Referrer::Other { description } if description == "panic argument")
    ));
}

#[test]
fn test_unknown_object_is_recoverable() {
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0]));
    let d = b.link().unwrap();

    assert!(d.addr(ObjId(7)).is_err());
    assert!(d.size(ObjId(7)).is_err());
    assert!(d.contents(ObjId(7)).is_err());
    assert!(d.edges(ObjId(7)).is_err());
    assert!(d.referrers(ObjId(7)).is_err());
    assert!(d.reachable(ObjId(7)).is_err());
    assert!(d.first_referrer(ObjId(7)).is_err());

    // 範囲内のIDは引き続き使える
    assert_eq!(d.addr(ObjId(0)).unwrap(), 0x1000);
}

#[test]
fn test_accessors() {
    let mut b = DumpBuilder::new();
    b.params_le8()
        .type_rec(0x8000, 8, "main.B", false, &[])
        .object(0x1000, 0x8000, 0, &le8(&[0x1234]));
    let d = b.link().unwrap();

    assert_eq!(d.addr(ObjId(0)).unwrap(), 0x1000);
    assert_eq!(d.size(ObjId(0)).unwrap(), 8);
    assert_eq!(d.full_type(ObjId(0)).unwrap().unwrap().name, "main.B");
    assert_eq!(d.contents(ObjId(0)).unwrap(), le8(&[0x1234]).as_slice());
    assert_eq!(d.find_containing(0x1004), Some(ObjId(0)));
    assert_eq!(d.find_containing(0x1008), None);
    assert_eq!(d.find_containing(0xfff), None);
}
