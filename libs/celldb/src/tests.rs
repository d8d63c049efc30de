use std::cell::Cell as StdCell;
use std::rc::Rc;

use geometry::prelude::*;
use test_log::test;

use crate::*;

fn rect(left: i64, bot: i64, right: i64, top: i64) -> Rect {
    Rect::from_sides(left, bot, right, top)
}

fn setup() -> (Database, LibraryId) {
    let mut db = Database::new();
    let lib = db.create_library(None, "work").unwrap();
    (db, lib)
}

fn place(db: &mut Database, cell: CellId, name: &str, master: CellId, x: i64, y: i64) -> InstanceId {
    db.create_instance(
        cell,
        name,
        master,
        Transformation::translate(x, y),
        PlacementStatus::Placed,
    )
    .unwrap()
}

#[derive(Default)]
struct Recorder {
    calls: StdCell<u32>,
    last: StdCell<ObserverFlags>,
}

impl CellObserver for Recorder {
    fn notify(&self, flags: ObserverFlags) {
        self.calls.set(self.calls.get() + 1);
        self.last.set(flags);
    }
}

#[test]
fn inv_placed_in_top() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let i1 = place(&mut db, top, "i1", inv, 0, 0);

    assert_eq!(db.instance_by_name(top, "i1"), Some(i1));
    assert_eq!(db.cell(inv).slave_instance_count(), 1);
    assert!(!db.is_leaf(top));
    assert!(db.is_unique(inv));

    place(&mut db, top, "i2", inv, 10, 0);
    assert!(!db.is_unique(inv));
    assert!(db.is_called_by(inv, top));
    assert!(!db.is_called_by(top, inv));
}

#[test]
fn cell_creation_checks() {
    let (mut db, lib) = setup();
    assert_eq!(db.create_cell(None, "A"), Err(Error::UnknownLibrary));
    assert_eq!(
        db.create_cell(Some(lib), ""),
        Err(Error::EmptyName { kind: "cell" })
    );
    let a = db.create_cell(Some(lib), "A").unwrap();
    assert!(matches!(
        db.create_cell(Some(lib), "A"),
        Err(Error::DuplicateCell { .. })
    ));
    assert_eq!(db.library_cell(lib, "A"), Some(a));

    db.set_cell_name(a, "B").unwrap();
    assert_eq!(db.library_cell(lib, "A"), None);
    assert_eq!(db.library_cell(lib, "B"), Some(a));
}

#[test]
fn duplicate_instance_names_are_rejected() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    place(&mut db, top, "i1", inv, 0, 0);

    let result = db.create_instance(
        top,
        "i1",
        inv,
        Transformation::identity(),
        PlacementStatus::Unplaced,
    );
    assert!(matches!(result, Err(Error::DuplicateInstance { .. })));
    assert_eq!(db.cell(top).instance_count(), 1);
    assert_eq!(db.cell(inv).slave_instance_count(), 1);
}

#[test]
fn cyclic_instantiation_is_rejected() {
    let (mut db, lib) = setup();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let mid = db.create_cell(Some(lib), "MID").unwrap();
    place(&mut db, top, "m", mid, 0, 0);

    assert!(matches!(
        db.create_instance(top, "self", top, Transformation::identity(), PlacementStatus::Placed),
        Err(Error::CyclicInstantiation { .. })
    ));
    assert!(matches!(
        db.create_instance(mid, "t", top, Transformation::identity(), PlacementStatus::Placed),
        Err(Error::CyclicInstantiation { .. })
    ));
    assert_eq!(db.cell(mid).instance_count(), 0);
}

/// TOP > a:MID > b:BOT > c:LEAF.
fn three_levels(db: &mut Database, lib: LibraryId) -> (CellId, InstanceId, InstanceId, InstanceId) {
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let mid = db.create_cell(Some(lib), "MID").unwrap();
    let bot = db.create_cell(Some(lib), "BOT").unwrap();
    let leaf = db.create_cell(Some(lib), "LEAF").unwrap();
    let a = place(db, top, "a", mid, 10, 0);
    let b = place(db, mid, "b", bot, 0, 20);
    let c = place(db, bot, "c", leaf, 1, 1);
    (top, a, b, c)
}

#[test]
fn paths_are_canonical() {
    let (mut db, lib) = setup();
    let (top, a, b, c) = three_levels(&mut db, lib);

    let by_name = db.path_from_name(top, "a.b.c").unwrap();
    let c_path = db.path_from_instance(c).unwrap();
    let bc = db.path_prepend(b, c_path).unwrap();
    let prepended = db.path_prepend(a, bc).unwrap();
    let a_path = db.path_from_instance(a).unwrap();
    let ab = db.path_append(a_path, b).unwrap();
    let appended = db.path_append(ab, c).unwrap();
    let b_path = db.path_from_instance(b).unwrap();
    let bc2 = db.path_append(b_path, c).unwrap();
    let concatenated = db.path_concat(a_path, bc2).unwrap();

    assert_eq!(by_name, prepended);
    assert_eq!(by_name, appended);
    assert_eq!(by_name, concatenated);
    assert_eq!(bc, bc2);

    assert_eq!(db.path_name(by_name).as_str(), "a.b.c");
    assert_eq!(
        db.path_transformation(appended).offset_point(),
        Point::new(11, 21)
    );
    assert_eq!(db.path_instances(by_name), vec![a, b, c]);
    assert_eq!(db.path_head_path(by_name), ab);
    assert_eq!(db.path_tail_path(by_name), bc);
    assert_eq!(db.path_owner_cell(by_name), Some(top));

    let count = db.shared_path_count();
    db.path_from_name(top, "a.b.c").unwrap();
    db.path_concat(ab, c_path).unwrap();
    assert_eq!(db.shared_path_count(), count);
}

#[test]
fn rotated_and_mirrored_paths_compose_instances() {
    let (mut db, lib) = setup();
    let (top, a, b, c) = three_levels(&mut db, lib);
    let ta = Transformation::from_offset_and_orientation(Point::new(10, 0), NamedOrientation::R90);
    let tb = Transformation::from_offset_and_orientation(Point::new(0, 20), NamedOrientation::ReflectVert);
    let tc = Transformation::from_offset_and_orientation(Point::new(3, -7), NamedOrientation::R270);
    db.set_transformation(a, ta).unwrap();
    db.set_transformation(b, tb).unwrap();
    db.set_transformation(c, tc).unwrap();

    let path = db.path_from_name(top, "a.b.c").unwrap();
    let composed = db.path_transformation(path);
    assert_eq!(composed, Transformation::cascade(ta, Transformation::cascade(tb, tc)));
    for p in [Point::new(0, 0), Point::new(5, 1), Point::new(-4, 9)] {
        assert_eq!(composed.apply(p), ta.apply(tb.apply(tc.apply(p))));
    }
    assert_eq!(composed.inv().apply(composed.apply(Point::new(5, 1))), Point::new(5, 1));

    let tail = db.path_tail_path(path);
    assert_eq!(
        db.path_transformation(tail).apply(Point::new(5, 1)),
        tb.apply(tc.apply(Point::new(5, 1)))
    );
}

#[test]
fn incompatible_and_invalid_paths() {
    let (mut db, lib) = setup();
    let (top, a, _, c) = three_levels(&mut db, lib);

    let c_path = db.path_from_instance(c).unwrap();
    assert!(matches!(
        db.path_prepend(a, c_path),
        Err(Error::IncompatiblePath { .. })
    ));
    assert!(matches!(
        db.path_from_name(top, "a.x"),
        Err(Error::InvalidPathName { .. })
    ));
    assert_eq!(db.path_from_name(top, "").unwrap(), Path::EMPTY);
}

#[test]
fn path_names_follow_the_configured_separator() {
    let config = DbConfig {
        name_separator: '/',
        ..Default::default()
    };
    let mut db = Database::with_config(config);
    let lib = db.create_library(None, "work").unwrap();
    let (top, _, _, _) = three_levels(&mut db, lib);

    let path = db.path_from_name(top, "a/b").unwrap();
    assert_eq!(db.path_name(path).as_str(), "a/b");
}

#[test]
fn renaming_and_moving_refresh_path_caches() {
    let (mut db, lib) = setup();
    let (top, a, _, _) = three_levels(&mut db, lib);
    let path = db.path_from_name(top, "a.b").unwrap();
    assert_eq!(db.path_name(path).as_str(), "a.b");
    assert_eq!(db.path_transformation(path).offset_point(), Point::new(10, 20));

    db.set_instance_name(a, "z").unwrap();
    db.set_transformation(a, Transformation::translate(0, 0)).unwrap();
    assert_eq!(db.path_name(path).as_str(), "z.b");
    assert_eq!(db.path_transformation(path).offset_point(), Point::new(0, 20));
}

#[test]
fn fitted_bounding_box_only_grows() {
    let (mut db, lib) = setup();
    let cell = db.create_cell(Some(lib), "C").unwrap();
    db.set_abutment_box(cell, Some(rect(0, 0, 10, 10))).unwrap();
    assert_eq!(db.cell_bounding_box(cell), Some(rect(0, 0, 10, 10)));

    let mut previous = rect(0, 0, 10, 10);
    db.open_update_session();
    for fitted in [rect(5, 5, 20, 20), rect(-5, 0, 1, 1), rect(2, 2, 3, 3)] {
        db.fit(cell, Some(fitted));
        let cached = db.cached_bounding_box(cell).unwrap();
        assert!(cached.contains(&previous));
        assert!(cached.contains(&fitted));
        previous = cached;
    }
    db.close_update_session();
    assert_eq!(previous, rect(-5, 0, 20, 20));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "fit outside an update session")]
fn fitting_requires_an_update_session() {
    let (mut db, lib) = setup();
    let cell = db.create_cell(Some(lib), "C").unwrap();
    db.fit(cell, Some(rect(0, 0, 1, 1)));
}

#[test]
fn moving_an_instance_moves_the_owner_box() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.set_abutment_box(inv, Some(rect(0, 0, 10, 10))).unwrap();
    let i = place(&mut db, top, "i", inv, 0, 0);
    assert_eq!(db.cell_bounding_box(top), Some(rect(0, 0, 10, 10)));

    db.set_transformation(i, Transformation::translate(100, 0)).unwrap();
    assert_eq!(db.cell_bounding_box(top), Some(rect(100, 0, 110, 10)));

    db.set_placement_status(i, PlacementStatus::Unplaced).unwrap();
    assert_eq!(db.cell_bounding_box(top), None);
}

#[test]
fn growing_a_master_grows_its_callers() {
    let (mut db, lib) = setup();
    let leaf = db.create_cell(Some(lib), "LEAF").unwrap();
    let mid = db.create_cell(Some(lib), "MID").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.set_abutment_box(leaf, Some(rect(0, 0, 10, 10))).unwrap();
    place(&mut db, mid, "l", leaf, 0, 0);
    place(&mut db, top, "m", mid, 100, 0);
    assert_eq!(db.cell_bounding_box(top), Some(rect(100, 0, 110, 10)));

    db.set_abutment_box(leaf, Some(rect(0, 0, 50, 10))).unwrap();
    assert_eq!(db.cell_bounding_box(mid), Some(rect(0, 0, 50, 10)));
    assert_eq!(db.cell_bounding_box(top), Some(rect(100, 0, 150, 10)));

    db.set_abutment_box(leaf, Some(rect(0, 0, 5, 5))).unwrap();
    assert_eq!(db.cell_bounding_box(top), Some(rect(100, 0, 105, 5)));
}

/// LEAF (with an off-box contact) placed in MID, MID placed in TOP.
fn slaved_hierarchy(db: &mut Database, lib: LibraryId) -> (CellId, CellId, CellId, ComponentId) {
    let m1 = db.register_layer("metal1", LayerMask::new(1)).unwrap();
    let leaf = db.create_cell(Some(lib), "LEAF").unwrap();
    let mid = db.create_cell(Some(lib), "MID").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.set_abutment_box(leaf, Some(rect(0, 0, 100, 100))).unwrap();
    db.set_abutment_box(mid, Some(rect(0, 0, 100, 100))).unwrap();
    db.set_abutment_box(top, Some(rect(0, 0, 200, 200))).unwrap();
    let net = db.create_net(leaf, "n").unwrap();
    let contact = db
        .create_contact(net, m1, Point::new(150, 50), 20, 20)
        .unwrap();
    place(db, mid, "l", leaf, 0, 0);
    place(db, top, "m", mid, 0, 0);
    (top, mid, leaf, contact)
}

#[test]
fn shrinking_slaved_geometry_invalidates_the_parent() {
    let (mut db, lib) = setup();
    let (_, mid, leaf, contact) = slaved_hierarchy(&mut db, lib);

    db.slave_abutment_box(leaf, mid).unwrap();
    assert!(db.issues().is_empty());
    assert!(db.shares_storage(leaf, mid));
    assert!(db.cell(leaf).flags().contains(CellFlags::MERGED_QUAD_TREE));
    db.cell_bounding_box(leaf);
    assert_eq!(db.cell_bounding_box(mid), Some(rect(0, 0, 160, 100)));

    db.open_update_session();
    db.translate_component(contact, -100, 0).unwrap();
    assert_eq!(db.cached_bounding_box(mid), None);
    db.close_update_session();

    assert_eq!(db.cell_bounding_box(mid), Some(rect(0, 0, 100, 100)));
}

#[test]
fn slaving_is_refused_for_shared_or_slaved_cells() {
    let (mut db, lib) = setup();
    let (top, mid, leaf, _) = slaved_hierarchy(&mut db, lib);
    place(&mut db, top, "m2", mid, 0, 100);

    db.slave_abutment_box(mid, top).unwrap();
    assert!(!db.shares_storage(mid, top));
    assert!(matches!(
        db.issues().iter().next().map(Issue::cause),
        Some(Cause::NotUnique { slave_instances: 2, .. })
    ));

    db.slave_abutment_box(leaf, mid).unwrap();
    db.slave_abutment_box(leaf, mid).unwrap();
    let issues = db.take_issues();
    assert_eq!(issues.num_errors(), 2);
    assert!(matches!(
        issues.iter().last().map(Issue::cause),
        Some(Cause::AlreadySlaved { .. })
    ));
}

#[test]
fn slaving_mismatched_boxes_warns_and_shifts() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let block = db.create_cell(Some(lib), "BLOCK").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.set_abutment_box(block, Some(rect(10, 10, 60, 60))).unwrap();
    db.set_abutment_box(top, Some(rect(0, 0, 100, 100))).unwrap();
    let i = place(&mut db, block, "i", inv, 20, 20);
    place(&mut db, top, "b", block, 0, 0);

    db.slave_abutment_box(block, top).unwrap();
    assert_eq!(db.issues().num_warnings(), 1);
    assert_eq!(db.cell(block).abutment_box(), Some(rect(0, 0, 100, 100)));
    assert_eq!(
        db.instance(i).transformation().offset_point(),
        Point::new(10, 10)
    );
}

#[test]
fn storage_swaps_fail_closed_while_geometry_is_pending() {
    let (mut db, lib) = setup();
    let (_, mid, leaf, contact) = slaved_hierarchy(&mut db, lib);
    db.slave_abutment_box(leaf, mid).unwrap();

    db.open_update_session();
    db.translate_component(contact, 0, 10).unwrap();
    assert_eq!(
        db.change_quad_tree(leaf, None),
        Err(Error::PendingGeometry(Name::new("LEAF")))
    );
    db.close_update_session();

    db.change_quad_tree(leaf, None).unwrap();
    assert!(!db.shares_storage(leaf, mid));
    assert!(!db.cell(leaf).flags().contains(CellFlags::MERGED_QUAD_TREE));
    assert!(db.is_go_materialized(GoId::Component(contact)));
}

/// MID holds one unplaced instance of LEAF and exposes net `a`.
/// TOP holds i1, i2 (placed) and i3 (unplaced) of MID; i3.a is on `sig`.
fn shared_master(db: &mut Database, lib: LibraryId) -> (CellId, CellId, [InstanceId; 3], NetId) {
    let leaf = db.create_cell(Some(lib), "LEAF").unwrap();
    let mid = db.create_cell(Some(lib), "MID").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.create_instance(
        mid,
        "x",
        leaf,
        Transformation::identity(),
        PlacementStatus::Unplaced,
    )
    .unwrap();
    let a = db.create_net(mid, "a").unwrap();
    db.set_external(a, true).unwrap();
    let i1 = place(db, top, "i1", mid, 0, 0);
    let i2 = place(db, top, "i2", mid, 10, 0);
    let i3 = db
        .create_instance(top, "i3", mid, Transformation::identity(), PlacementStatus::Unplaced)
        .unwrap();
    let sig = db.create_net(top, "sig").unwrap();
    let plug = db.plug_for(i3, a).unwrap();
    db.set_plug_net(plug, Some(sig)).unwrap();
    (top, mid, [i1, i2, i3], sig)
}

#[test]
fn uniquify_clones_the_master_of_unplaced_duplicates() {
    let (mut db, lib) = setup();
    let (top, mid, [i1, i2, i3], sig) = shared_master(&mut db, lib);

    db.uniquify(top, 1).unwrap();

    let clones = db.cloned_cells(mid);
    assert_eq!(clones.len(), 1);
    let clone = clones[0];
    assert_eq!(db.cell(clone).name().as_str(), "MID_u01");
    assert_eq!(db.instance(i3).master(), clone);
    assert_eq!(db.instance(i1).master(), mid);
    assert_eq!(db.instance(i2).master(), mid);
    assert!(db.is_unique(clone));
    assert_eq!(db.cell(mid).slave_instance_count(), 2);

    assert!(db.is_uniquified(clone));
    assert!(!db.is_uniquify_master(clone));
    assert!(db.is_uniquify_master(mid));
    assert_eq!(db.clone_master(clone), mid);
    assert!(!db.cell(clone).flags().contains(CellFlags::PLACED));
    assert_eq!(db.cell(clone).instance_count(), 1);

    let a = db.net_by_name(clone, "a").unwrap();
    let plug = db.plug_for(i3, a).unwrap();
    assert_eq!(db.component(plug).net(), Some(sig));
    assert_eq!(db.net_plugs(sig), vec![plug]);
}

#[test]
fn uniquify_skips_terminal_and_placed_masters() {
    let (mut db, lib) = setup();
    let (top, mid, _, _) = shared_master(&mut db, lib);
    db.set_terminal(mid, true).unwrap();
    db.uniquify(top, 2).unwrap();
    assert!(db.cloned_cells(mid).is_empty());

    db.set_terminal(mid, false).unwrap();
    let x = db.instance_by_name(mid, "x").unwrap();
    db.set_placement_status(x, PlacementStatus::Placed).unwrap();
    db.uniquify(top, 2).unwrap();
    assert!(db.cloned_cells(mid).is_empty());
    assert!(db.cell(mid).flags().contains(CellFlags::PLACED));
}

#[test]
fn clone_names_use_the_configured_width() {
    let config = DbConfig {
        uniquify_suffix_width: 3,
        ..Default::default()
    };
    let mut db = Database::with_config(config);
    let lib = db.create_library(None, "work").unwrap();
    let cell = db.create_cell(Some(lib), "BUF").unwrap();
    db.set_abutment_box(cell, Some(rect(0, 0, 4, 4))).unwrap();

    let first = db.clone_cell(cell).unwrap();
    let second = db.clone_cell(first).unwrap();
    assert_eq!(db.cell(first).name().as_str(), "BUF_u001");
    assert_eq!(db.cell(second).name().as_str(), "BUF_u002");
    assert_eq!(db.clone_master(second), cell);
    assert_eq!(db.cloned_cells(cell), vec![first, second]);
    assert_eq!(db.cell(second).abutment_box(), Some(rect(0, 0, 4, 4)));
    assert!(db.cell(second).flags().contains(CellFlags::PLACED));

    db.destroy_cell(cell).unwrap();
    assert!(db.uniquify_relation(first).is_none());
}

/// INV exposes net `a` with a pin. TOP places i1 and i2 of INV, both on
/// net `n`, which also has a pin of its own.
fn flat_design(db: &mut Database, lib: LibraryId) -> (CellId, CellId, NetId, [InstanceId; 2]) {
    let m1 = db.register_layer("metal1", LayerMask::new(1)).unwrap();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let a = db.create_net(inv, "a").unwrap();
    db.set_external(a, true).unwrap();
    db.create_pin(a, "a", m1, rect(0, 0, 2, 2)).unwrap();
    db.create_pin(a, "a2", m1, rect(4, 0, 10, 6)).unwrap();

    let n = db.create_net(top, "n").unwrap();
    db.create_pin(n, "n", m1, rect(-10, -10, -8, -8)).unwrap();
    let i1 = place(db, top, "i1", inv, 0, 0);
    let i2 = place(db, top, "i2", inv, 20, 0);
    for i in [i1, i2] {
        let plug = db.plug_for(i, a).unwrap();
        db.set_plug_net(plug, Some(n)).unwrap();
    }
    (top, inv, n, [i1, i2])
}

#[test]
fn flattening_top_nets_is_idempotent() {
    let (mut db, lib) = setup();
    let (top, _, n, [i1, _]) = flat_design(&mut db, lib);

    db.flatten_nets(top, FlattenFlags::empty()).unwrap();
    let first = db.net_routing_pads(n);
    assert_eq!(first.len(), 3);
    assert!(db.cell(top).flags().contains(CellFlags::FLATTENED_NETS));

    let through_i1: Vec<_> = first
        .iter()
        .filter_map(|&rp| match db.component(rp).kind() {
            ComponentKind::RoutingPad { occurrence, .. } if !occurrence.path().is_empty() => {
                Some(*occurrence)
            }
            _ => None,
        })
        .filter(|o| db.path_head_instance(o.path()) == Some(i1))
        .collect();
    assert_eq!(through_i1.len(), 1);
    assert_eq!(db.occurrence_name(through_i1[0]).as_str(), "i1.a2");
    assert_eq!(
        db.occurrence_bounding_box(through_i1[0]),
        Some(rect(4, 0, 10, 6))
    );

    db.flatten_nets(top, FlattenFlags::empty()).unwrap();
    let second = db.net_routing_pads(n);
    assert_eq!(first.len(), second.len());
    for rp in &first {
        assert!(second.contains(rp));
    }
}

fn routing_pad_through(db: &Database, net: NetId, instance: Option<InstanceId>) -> ComponentId {
    db.net_routing_pads(net)
        .into_iter()
        .find(|&rp| match db.component(rp).kind() {
            ComponentKind::RoutingPad { occurrence, .. } => {
                db.path_head_instance(occurrence.path()) == instance
            }
            _ => false,
        })
        .unwrap()
}

#[test]
fn routing_pads_follow_moved_instances_and_components() {
    let (mut db, lib) = setup();
    let (top, inv, n, [i1, i2]) = flat_design(&mut db, lib);
    db.flatten_nets(top, FlattenFlags::empty()).unwrap();
    let rp1 = routing_pad_through(&db, n, Some(i1));
    let rp2 = routing_pad_through(&db, n, Some(i2));
    let local = routing_pad_through(&db, n, None);
    assert!(db.gos_in(top, rect(25, 1, 29, 5)).contains(&GoId::Component(rp2)));

    db.set_transformation(i2, Transformation::translate(100, 0)).unwrap();
    assert_eq!(db.component_bounding_box(rp2), Some(rect(104, 0, 110, 6)));
    assert!(!db.gos_in(top, rect(25, 1, 29, 5)).contains(&GoId::Component(rp2)));
    assert!(db.gos_in(top, rect(105, 1, 109, 5)).contains(&GoId::Component(rp2)));

    let a = db.net_by_name(inv, "a").unwrap();
    let a2 = db
        .net_pins(a)
        .into_iter()
        .find(|&p| db.component_bounding_box(p) == Some(rect(4, 0, 10, 6)))
        .unwrap();
    db.translate_component(a2, 0, 10).unwrap();
    assert!(!db.gos_in(top, rect(5, 1, 9, 5)).contains(&GoId::Component(rp1)));
    assert!(db.gos_in(top, rect(5, 11, 9, 15)).contains(&GoId::Component(rp1)));
    assert!(db.gos_in(top, rect(105, 11, 109, 15)).contains(&GoId::Component(rp2)));

    let pin = db.net_pins(n)[0];
    db.translate_component(pin, 0, -5).unwrap();
    assert!(db.gos_in(top, rect(-10, -15, -8, -13)).contains(&GoId::Component(local)));
    assert!(!db.gos_in(top, rect(-10, -10, -8, -8)).contains(&GoId::Component(local)));
}

#[test]
fn flattening_nested_nets_creates_deep_nets() {
    let (mut db, lib) = setup();
    let (_, inv, _, _) = flat_design(&mut db, lib);
    let a = db.net_by_name(inv, "a").unwrap();
    let mid = db.create_cell(Some(lib), "MID").unwrap();
    let chip = db.create_cell(Some(lib), "CHIP").unwrap();
    let m = db.create_net(mid, "m").unwrap();
    let u = place(&mut db, mid, "u", inv, 0, 0);
    let plug = db.plug_for(u, a).unwrap();
    db.set_plug_net(plug, Some(m)).unwrap();
    let k = db
        .create_instance(chip, "k", mid, Transformation::identity(), PlacementStatus::Unplaced)
        .unwrap();

    assert_eq!(db.get_deep_net(chip, Path::EMPTY, m), None);
    db.flatten_nets(chip, FlattenFlags::WARN_ON_UNPLACED_INSTANCES)
        .unwrap();

    let deep = db.net_by_name(chip, "k.m").unwrap();
    assert!(db.net(deep).is_deep());
    let k_path = db.path_from_instance(k).unwrap();
    assert_eq!(db.get_deep_net(chip, k_path, m), Some(deep));
    assert_eq!(db.net_routing_pads(deep).len(), 1);
    assert_eq!(db.slave_entities(chip, k).len(), 2);
    assert_eq!(db.issues().num_warnings(), 1);

    db.flatten_nets(chip, FlattenFlags::WARN_ON_UNPLACED_INSTANCES)
        .unwrap();
    assert_eq!(db.cell(chip).net_count(), 1);
    assert_eq!(db.net_routing_pads(deep).len(), 1);

    db.destroy_instance(k).unwrap();
    assert_eq!(db.net_by_name(chip, "k.m"), None);
    assert_eq!(db.cell(chip).net_count(), 0);
    assert!(db.cell(chip).slave_entities.is_empty());
}

#[test]
fn clock_nets_can_be_left_unflattened() {
    let (mut db, lib) = setup();
    let (top, _, n, _) = flat_design(&mut db, lib);
    db.set_net_type(n, NetType::Clock).unwrap();

    db.flatten_nets(top, FlattenFlags::NO_CLOCK_FLATTEN).unwrap();
    assert!(db.net_routing_pads(n).is_empty());
    db.flatten_nets(top, FlattenFlags::empty()).unwrap();
    assert_eq!(db.net_routing_pads(n).len(), 3);
}

#[test]
fn routing_pads_are_chained_into_rings() {
    let (mut db, lib) = setup();
    let (top, _, n, [i1, _]) = flat_design(&mut db, lib);
    let m1 = db.layer_by_name("metal1").unwrap();
    db.flatten_nets(top, FlattenFlags::empty()).unwrap();

    let inv = db.instance(i1).master();
    let a = db.net_by_name(inv, "a").unwrap();
    let plug = db.plug_for(i1, a).unwrap();
    let wire = db
        .create_wire(n, m1, Point::new(0, 0), Point::new(0, 20), 2)
        .unwrap();
    db.set_anchor(wire, Some(plug)).unwrap();

    db.create_routing_pad_rings(top, FlattenFlags::BUILD_CLOCK_RINGS)
        .unwrap();
    let rps = db.net_routing_pads(n);
    assert!(rps.iter().all(|&rp| !db.is_attached(rp)));

    db.create_routing_pad_rings(top, FlattenFlags::BUILD_RINGS)
        .unwrap();
    assert_eq!(db.ring(rps[0]).len(), rps.len());
    assert_eq!(db.issues().num_errors(), 1);
    assert!(matches!(
        db.issues().iter().next().map(Issue::cause),
        Some(Cause::PlugHasSlaveHooks { .. })
    ));
}

#[test]
fn global_supply_nets_need_their_own_flag() {
    let (mut db, lib) = setup();
    let (top, _, n, _) = flat_design(&mut db, lib);
    db.set_net_global(n, true).unwrap();
    db.set_net_type(n, NetType::Power).unwrap();
    db.flatten_nets(top, FlattenFlags::empty()).unwrap();

    db.create_routing_pad_rings(top, FlattenFlags::BUILD_RINGS)
        .unwrap();
    let rps = db.net_routing_pads(n);
    assert!(rps.iter().all(|&rp| !db.is_attached(rp)));

    db.create_routing_pad_rings(top, FlattenFlags::BUILD_SUPPLY_RINGS)
        .unwrap();
    assert_eq!(db.ring(rps[0]).len(), 3);
}

#[test]
fn hyper_net_walks_up_and_down() {
    let (mut db, lib) = setup();
    let (top, inv, n, [i1, i2]) = flat_design(&mut db, lib);
    let a = db.net_by_name(inv, "a").unwrap();
    let i1_path = db.path_from_instance(i1).unwrap();

    let root = db.hyper_net_root_net_occurrence(Occurrence::new(a, i1_path));
    assert_eq!(root, Occurrence::new(n, Path::EMPTY));

    let hyper_net = HyperNet::new(root);
    let occurrences = db.hyper_net_occurrences(&hyper_net);
    assert_eq!(occurrences.len(), 3);
    let i2_path = db.path_from_instance(i2).unwrap();
    assert!(occurrences.contains(&Occurrence::new(a, i2_path)));
    assert_eq!(db.leaf_plug_occurrences(&hyper_net).len(), 2);

    let roots = db.hyper_net_root_net_occurrences(top);
    assert_eq!(roots, vec![Occurrence::new(n, Path::EMPTY)]);
}

#[test]
fn destroying_a_cell_cascades() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    db.set_abutment_box(inv, Some(rect(0, 0, 5, 5))).unwrap();
    let a = db.create_net(inv, "a").unwrap();
    db.set_external(a, true).unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let mut instances = Vec::new();
    for k in 0..4 {
        instances.push(place(&mut db, top, &format!("i{k}"), inv, 10 * k, 0));
    }
    let mut nets = Vec::new();
    for k in 0..3 {
        nets.push(db.create_net(top, format!("n{k}")).unwrap());
    }
    db.add_net_alias(nets[0], "alias").unwrap();
    let plug = db.plug_for(instances[0], a).unwrap();
    db.set_plug_net(plug, Some(nets[0])).unwrap();
    db.create_extension_slice(top, "ext1").unwrap();
    let ext2 = db.create_extension_slice(top, "ext2").unwrap();
    assert_eq!(db.extension_slice_mask(top, ["ext1", "ext2"]), 0b11);
    assert!(db
        .insert_extension_go(ext2, GoId::Instance(instances[1]))
        .unwrap());
    db.create_marker(top, "origin", Point::zero()).unwrap();
    db.flatten_nets(top, FlattenFlags::empty()).unwrap();

    db.destroy_cell(top).unwrap();

    assert_eq!(db.library_cell(lib, "TOP"), None);
    assert_eq!(db.cell(inv).slave_instance_count(), 0);
    assert!(instances.iter().all(|&i| db.try_instance(i).is_none()));
    assert!(nets.iter().all(|&n| db.try_net(n).is_none()));
    assert!(db.try_component(plug).is_none());
    assert!(db.extension_slices.is_empty());
    assert!(db.markers.is_empty());
    assert!(db.shared_paths.is_empty());
    assert!(db.cells.values().all(|c| c.slave_entities.is_empty()));
    assert!(db.components.is_empty());
}

#[test]
fn destroying_a_master_destroys_its_instances() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    place(&mut db, top, "i1", inv, 0, 0);
    place(&mut db, top, "i2", inv, 0, 0);

    db.destroy_cell(inv).unwrap();
    assert_eq!(db.cell(top).instance_count(), 0);
    assert!(db.is_leaf(top));
    assert_eq!(db.destroy_cell(inv), Err(Error::StaleId("cell")));
}

#[test]
fn destroying_a_library_destroys_sub_libraries() {
    let (mut db, lib) = setup();
    let sub = db.create_library(Some(lib), "cells").unwrap();
    let inv = db.create_cell(Some(sub), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    place(&mut db, top, "i", inv, 0, 0);
    assert!(matches!(
        db.create_library(Some(lib), "cells"),
        Err(Error::DuplicateLibrary(_))
    ));

    db.destroy_library(lib).unwrap();
    assert!(db.try_cell(top).is_none());
    assert!(db.try_cell(inv).is_none());
    assert_eq!(db.root_library("work"), None);
    assert!(db.instances.is_empty());
}

#[test]
fn observers_see_one_change_per_session() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let recorder = Rc::new(Recorder::default());
    let observer: Rc<dyn CellObserver> = recorder.clone();
    db.add_observer(top, &observer).unwrap();

    place(&mut db, top, "i1", inv, 0, 0);
    assert_eq!(recorder.calls.get(), 1);
    assert_eq!(recorder.last.get(), ObserverFlags::CELL_CHANGED);

    db.open_update_session();
    db.create_net(top, "a").unwrap();
    db.create_net(top, "b").unwrap();
    place(&mut db, top, "i2", inv, 0, 0);
    assert_eq!(recorder.calls.get(), 1);
    db.close_update_session();
    assert_eq!(recorder.calls.get(), 2);

    db.destroy_cell(top).unwrap();
    assert_eq!(recorder.last.get(), ObserverFlags::CELL_DESTROYED);
}

#[test]
fn renames_and_extension_slices_notify_observers() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.set_abutment_box(inv, Some(rect(0, 0, 10, 10))).unwrap();
    let i = place(&mut db, top, "i", inv, 0, 0);
    let net = db.create_net(top, "n").unwrap();
    let recorder = Rc::new(Recorder::default());
    let observer: Rc<dyn CellObserver> = recorder.clone();
    db.add_observer(top, &observer).unwrap();

    db.set_cell_name(top, "CHIP").unwrap();
    assert_eq!(recorder.calls.get(), 1);
    assert_eq!(recorder.last.get(), ObserverFlags::CELL_CHANGED);
    db.set_instance_name(i, "j").unwrap();
    assert_eq!(recorder.calls.get(), 2);
    db.set_net_name(net, "m").unwrap();
    assert_eq!(recorder.calls.get(), 3);

    let slice = db.create_extension_slice(top, "keepout").unwrap();
    assert_eq!(recorder.calls.get(), 4);
    assert!(db.insert_extension_go(slice, GoId::Instance(i)).unwrap());
    assert_eq!(recorder.calls.get(), 5);
    assert!(db.remove_extension_go(slice, GoId::Instance(i)).unwrap());
    assert_eq!(recorder.calls.get(), 6);
    db.destroy_extension_slice(slice).unwrap();
    assert_eq!(recorder.calls.get(), 7);

    db.open_update_session();
    db.set_cell_name(top, "TOP").unwrap();
    db.set_net_name(net, "n").unwrap();
    assert_eq!(recorder.calls.get(), 7);
    db.close_update_session();
    assert_eq!(recorder.calls.get(), 8);
}

#[test]
fn dropped_observers_are_pruned() {
    let (mut db, lib) = setup();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let recorder = Rc::new(Recorder::default());
    let observer: Rc<dyn CellObserver> = recorder.clone();
    db.add_observer(top, &observer).unwrap();
    db.remove_observer(top, &observer).unwrap();
    db.create_net(top, "a").unwrap();
    assert_eq!(recorder.calls.get(), 0);

    db.add_observer(top, &observer).unwrap();
    drop(observer);
    drop(recorder);
    db.create_net(top, "b").unwrap();
    assert!(db.cell(top).observers.is_empty());
}

#[test]
fn sessions_nest() {
    let (mut db, _) = setup();
    db.open_update_session();
    db.open_update_session();
    assert_eq!(db.update_session_depth(), 2);
    db.close_update_session();
    assert_eq!(db.update_session_depth(), 1);
    db.close_update_session();
    assert_eq!(db.update_session_depth(), 0);
    db.close_update_session();
    assert_eq!(db.update_session_depth(), 0);
}

#[test]
fn unplaced_instances_join_the_quad_tree_when_placed() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    db.set_abutment_box(inv, Some(rect(0, 0, 10, 10))).unwrap();
    let i = db
        .create_instance(top, "i", inv, Transformation::identity(), PlacementStatus::Unplaced)
        .unwrap();
    assert!(!db.is_go_materialized(GoId::Instance(i)));

    db.set_placement_status(i, PlacementStatus::Fixed).unwrap();
    assert!(db.is_go_materialized(GoId::Instance(i)));
    assert_eq!(db.gos_in(top, rect(5, 5, 6, 6)), vec![GoId::Instance(i)]);

    db.unmaterialize(top).unwrap();
    assert!(!db.is_go_materialized(GoId::Instance(i)));
    assert_eq!(db.cell_bounding_box(top), None);
    db.materialize(top).unwrap();
    assert_eq!(db.cell_bounding_box(top), Some(rect(0, 0, 10, 10)));
}

#[test]
fn net_aliases_and_merging() {
    let (mut db, lib) = setup();
    let cell = db.create_cell(Some(lib), "C").unwrap();
    let a = db.create_net(cell, "a").unwrap();
    let b = db.create_net(cell, "b").unwrap();

    assert!(db.add_net_alias(a, "alias").unwrap());
    assert!(!db.add_net_alias(a, "alias").unwrap());
    assert_eq!(db.net_by_name(cell, "alias"), Some(a));
    assert!(matches!(
        db.add_net_alias(b, "alias"),
        Err(Error::DuplicateNet { .. })
    ));
    assert!(matches!(
        db.create_net(cell, "alias"),
        Err(Error::DuplicateNet { .. })
    ));
    db.add_net_alias(b, "other").unwrap();

    db.merge_nets(a, b).unwrap();
    assert!(db.try_net(b).is_none());
    assert_eq!(db.net_by_name(cell, "b"), Some(a));
    assert_eq!(db.net_by_name(cell, "other"), Some(a));
    assert!(db.is_net_alias(a, "b"));

    assert!(db.remove_net_alias(a, "alias").unwrap());
    assert_eq!(db.net_by_name(cell, "alias"), None);
}

#[test]
fn merging_external_nets_merges_upper_nets() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let a = db.create_net(inv, "a").unwrap();
    let b = db.create_net(inv, "b").unwrap();
    db.set_external(a, true).unwrap();
    db.set_external(b, true).unwrap();
    let i = place(&mut db, top, "i", inv, 0, 0);
    let x = db.create_net(top, "x").unwrap();
    let y = db.create_net(top, "y").unwrap();
    let plug_a = db.plug_for(i, a).unwrap();
    let plug_b = db.plug_for(i, b).unwrap();
    db.set_plug_net(plug_a, Some(x)).unwrap();
    db.set_plug_net(plug_b, Some(y)).unwrap();

    db.merge_nets(a, b).unwrap();
    assert!(db.try_component(plug_b).is_none());
    assert!(db.try_net(x).is_none() != db.try_net(y).is_none());
    let upper = db.component(plug_a).net().unwrap();
    assert_eq!(db.net_by_name(top, "x"), Some(upper));
    assert_eq!(db.net_by_name(top, "y"), Some(upper));
}

#[test]
fn external_nets_own_plugs() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let a = db.create_net(inv, "a").unwrap();
    let i = place(&mut db, top, "i", inv, 0, 0);
    assert_eq!(db.plug_for(i, a), None);

    db.set_external(a, true).unwrap();
    let plug = db.plug_for(i, a).unwrap();
    assert_eq!(db.slave_plugs(a), vec![plug]);
    let n = db.create_net(top, "n").unwrap();
    db.set_plug_net(plug, Some(n)).unwrap();
    assert!(matches!(
        db.set_external(a, false),
        Err(Error::ConnectedPlug { .. })
    ));

    db.set_plug_net(plug, None).unwrap();
    db.set_external(a, false).unwrap();
    assert_eq!(db.plug_for(i, a), None);
    assert_eq!(db.destroy_component(plug), Err(Error::StaleId("component")));
    assert!(db.net_components(n).is_empty());
}

#[test]
fn rebinding_a_master_moves_plugs_by_name() {
    let (mut db, lib) = setup();
    let inv = db.create_cell(Some(lib), "INV").unwrap();
    let buf = db.create_cell(Some(lib), "BUF").unwrap();
    let nand = db.create_cell(Some(lib), "NAND").unwrap();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    for cell in [inv, buf] {
        let a = db.create_net(cell, "a").unwrap();
        db.set_external(a, true).unwrap();
    }
    let z = db.create_net(buf, "z").unwrap();
    db.set_external(z, true).unwrap();
    let i = place(&mut db, top, "i", inv, 0, 0);
    let n = db.create_net(top, "n").unwrap();
    let inv_a = db.net_by_name(inv, "a").unwrap();
    let plug = db.plug_for(i, inv_a).unwrap();
    db.set_plug_net(plug, Some(n)).unwrap();

    assert!(matches!(
        db.set_master_cell(i, nand),
        Err(Error::MissingMasterNet { .. })
    ));

    db.set_master_cell(i, buf).unwrap();
    let buf_a = db.net_by_name(buf, "a").unwrap();
    assert_eq!(db.plug_for(i, buf_a), Some(plug));
    assert_eq!(db.component(plug).net(), Some(n));
    assert!(db.plug_for(i, z).is_some());
    assert_eq!(db.cell(inv).slave_instance_count(), 0);
    assert_eq!(db.cell(buf).slave_instance_count(), 1);
}

#[test]
fn extension_slices_are_named_per_cell() {
    let (mut db, lib) = setup();
    let top = db.create_cell(Some(lib), "TOP").unwrap();
    let marker = db.create_marker(top, "m", Point::new(3, 3)).unwrap();
    let ext = db.create_extension_slice(top, "blockages").unwrap();
    assert!(matches!(
        db.create_extension_slice(top, "blockages"),
        Err(Error::DuplicateExtensionSlice { .. })
    ));
    assert_eq!(db.extension_slice(top, "blockages"), Some(ext));

    db.insert_extension_go(ext, GoId::Marker(marker)).unwrap();
    assert_eq!(
        db.extension_gos_in(ext, rect(0, 0, 5, 5)),
        vec![GoId::Marker(marker)]
    );
    db.destroy_marker(marker).unwrap();
    assert!(db.extension_gos_in(ext, rect(0, 0, 5, 5)).is_empty());

    db.destroy_extension_slice(ext).unwrap();
    assert_eq!(db.extension_slice(top, "blockages"), None);
}
