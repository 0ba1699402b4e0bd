use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdef_engine::deform::{
    BindData, BindError, BindMode, BindOptions, DeformError, VertexGroup, bind, decode_bind_data,
    deform, encode_bind_data,
};
use sdef_engine::geom::{Point3, PolyMesh, Transform, Vec3};

fn grid(n: u32, height: impl Fn(f64, f64) -> f64) -> PolyMesh {
    let mut positions = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (f64::from(i), f64::from(j));
            positions.push(Point3::new(x, y, height(x, y)));
        }
    }
    let mut polygons = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let v = j * (n + 1) + i;
            polygons.push([v, v + 1, v + n + 2, v + n + 1]);
        }
    }
    PolyMesh::from_polygons(positions, &polygons).expect("valid grid")
}

fn curved_grid() -> PolyMesh {
    grid(5, |x, y| 0.15 * (x - 2.5) * (x - 2.5) - 0.1 * y)
}

fn cube() -> PolyMesh {
    let mut positions = Vec::new();
    for z in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for x in [-1.0, 1.0] {
                positions.push(Point3::new(x, y, z));
            }
        }
    }
    let faces = [
        [0u32, 2, 3, 1],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 4, 6, 2],
        [1, 3, 7, 5],
    ];
    PolyMesh::from_polygons(positions, &faces).expect("valid cube")
}

fn random_points(rng: &mut StdRng, count: usize, lo: f64, hi: f64, z: f64) -> Vec<Point3> {
    (0..count)
        .map(|_| {
            Point3::new(
                rng.random_range(lo..hi),
                rng.random_range(lo..hi),
                rng.random_range(-z..z),
            )
        })
        .collect()
}

fn moved(mesh: &PolyMesh, xf: Transform) -> PolyMesh {
    let mut out = mesh.clone();
    out.set_positions(mesh.transformed_positions(xf))
        .expect("same vertex count");
    out
}

fn assert_close(a: Point3, b: Point3, tol: f64) {
    assert!(a.distance_to(b) < tol, "{a:?} != {b:?}");
}

#[test]
fn influences_and_weights_sum_to_one() {
    let target = curved_grid();
    let mut rng = StdRng::seed_from_u64(7);
    let source = random_points(&mut rng, 200, 0.3, 4.7, 0.6);

    let (data, diag) = bind(&source, &target, &BindOptions::new()).expect("bind");
    assert_eq!(diag.bound_vertex_count, source.len());
    assert_eq!(
        diag.ngon_binds + diag.triangle_binds + diag.centroid_binds,
        data.bind_count()
    );

    for vertex in &data.verts {
        let total: f64 = vertex.binds.iter().map(|b| b.influence).sum();
        assert!((total - 1.0).abs() < 1e-9, "influence sum {total}");
        for bind in &vertex.binds {
            assert!(bind.influence > 0.0 && bind.influence <= 1.0 + 1e-12);
            let sum: f64 = bind.vert_weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "weight sum {sum}");
            assert!(bind.normal_dist.is_finite());
        }
    }
}

#[test]
fn unchanged_target_reproduces_bind_positions() {
    let target = curved_grid();
    let mut rng = StdRng::seed_from_u64(11);
    let source = random_points(&mut rng, 150, 0.3, 4.7, 0.6);

    let (data, _) = bind(&source, &target, &BindOptions::new()).expect("bind");
    let mut positions = source.clone();
    deform(&data, &target, &mut positions, 1.0, None).expect("deform");

    for (before, after) in source.iter().zip(&positions) {
        assert_close(*before, *after, 1e-9);
    }
}

#[test]
fn zero_strength_leaves_positions_unchanged() {
    let target = curved_grid();
    let mut rng = StdRng::seed_from_u64(3);
    let source = random_points(&mut rng, 50, 0.3, 4.7, 0.6);
    let (data, _) = bind(&source, &target, &BindOptions::new()).expect("bind");

    let warped = moved(&target, Transform::rotate_z(0.7));
    let mut positions = source.clone();
    let diag = deform(&data, &warped, &mut positions, 0.0, None).expect("deform");
    assert_eq!(positions, source);
    assert_eq!(diag.deformed_vertices, 0);
}

#[test]
fn rigid_target_motion_moves_source_rigidly() {
    let target = curved_grid();
    let mut rng = StdRng::seed_from_u64(23);
    let source = random_points(&mut rng, 80, 0.3, 4.7, 0.6);
    let (data, _) = bind(&source, &target, &BindOptions::new()).expect("bind");

    let xf = Transform::translate(Vec3::new(0.5, -2.0, 3.0)).compose(Transform::rotate_z(1.1));
    let mut positions = source.clone();
    deform(&data, &moved(&target, xf), &mut positions, 1.0, None).expect("deform");

    for (before, after) in source.iter().zip(&positions) {
        assert_close(xf.apply_point(*before), *after, 1e-8);
    }
}

#[test]
fn closed_cage_carries_interior_points() {
    let cage = cube();
    let source = vec![
        Point3::new(0.5, 0.2, 0.1),
        Point3::new(-0.6, 0.6, 0.6),
        Point3::new(0.0, 0.0, 0.8),
        Point3::new(0.9, -0.3, -0.4),
    ];
    let (data, _) = bind(&source, &cage, &BindOptions::new()).expect("bind");

    let xf = Transform::rotate_axis(Vec3::new(1.0, 1.0, 0.0), 0.8).expect("axis");
    let mut positions = source.clone();
    deform(&data, &moved(&cage, xf), &mut positions, 1.0, None).expect("deform");
    for (before, after) in source.iter().zip(&positions) {
        assert_close(xf.apply_point(*before), *after, 1e-8);
    }
}

#[test]
fn quad_centroid_binds_single_ngon() {
    let quad = grid(1, |_, _| 0.0);
    let source = [Point3::new(0.5, 0.5, 0.0)];
    let (data, diag) = bind(&source, &quad, &BindOptions::new()).expect("bind");

    assert_eq!((diag.ngon_binds, diag.triangle_binds, diag.centroid_binds), (1, 0, 0));
    let bind = &data.verts[0].binds[0];
    assert_eq!(bind.mode, BindMode::Ngon);
    assert_eq!(bind.vert_inds.len(), 4);
    for weight in &bind.vert_weights {
        assert!((weight - 0.25).abs() < 1e-9);
    }
    assert!(bind.normal_dist.abs() < 1e-12);
}

#[test]
fn shared_edge_midpoint_binds_twice() {
    let positions = vec![
        Point3::new(0.0, -1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(-1.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ];
    let target = PolyMesh::from_polygons(positions, &[[0u32, 1, 2], [1, 0, 3]]).expect("mesh");
    let source = vec![Point3::ORIGIN];

    let (data, _) = bind(&source, &target, &BindOptions::new()).expect("bind");
    let binds = &data.verts[0].binds;
    assert_eq!(binds.len(), 2);
    let total: f64 = binds.iter().map(|b| b.influence).sum();
    assert!((total - 1.0).abs() < 1e-9);

    let mut out = source.clone();
    deform(&data, &target, &mut out, 1.0, None).expect("deform");
    assert_close(out[0], Point3::ORIGIN, 1e-9);
}

#[test]
fn non_manifold_target_is_rejected() {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, -1.0, 0.0),
        Point3::new(0.5, 0.0, 1.0),
    ];
    let target =
        PolyMesh::from_polygons(positions, &[[0u32, 1, 2], [1, 0, 3], [0, 1, 4]]).expect("mesh");
    let err = bind(&[Point3::new(0.5, 0.3, 0.2)], &target, &BindOptions::new()).unwrap_err();
    assert_eq!(err, BindError::NonManifold);
    assert_eq!(err.to_string(), "Target has edges with more than two polygons");
}

#[test]
fn concave_target_is_rejected() {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 1.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
    ];
    let target = PolyMesh::from_polygons(positions, &[[0u32, 1, 2, 3]]).expect("mesh");
    let err = bind(&[Point3::new(0.4, 1.0, 0.5)], &target, &BindOptions::new()).unwrap_err();
    assert_eq!(err, BindError::ConcavePolygon);
}

#[test]
fn overlapping_corners_are_rejected() {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let target = PolyMesh::from_polygons(positions, &[[0u32, 1, 2, 3]]).expect("mesh");
    let err = bind(&[Point3::new(0.2, 0.3, 0.1)], &target, &BindOptions::new()).unwrap_err();
    assert_eq!(err, BindError::OverlappingVertices);
}

#[test]
fn sparse_bind_drops_unweighted_vertices() {
    let target = curved_grid();
    let source = vec![
        Point3::new(1.2, 1.3, 0.5),
        Point3::new(2.2, 3.1, 0.1),
        Point3::new(3.6, 0.7, -0.3),
        Point3::new(4.1, 4.2, 0.2),
    ];
    let group = VertexGroup::new("pin", vec![0.5, 0.0, 1.0, 0.0]);
    let options = BindOptions::new().with_group(Some(&group)).with_sparse(true);
    let (data, diag) = bind(&source, &target, &options).expect("bind");

    assert!(data.sparse);
    assert_eq!(diag.bound_vertex_count, 2);
    let bound: Vec<u32> = data.verts.iter().map(|v| v.vertex_idx).collect();
    assert_eq!(bound, vec![0, 2]);

    // Unbound vertices stay put; bound ones follow the target.
    let lift = Transform::translate(Vec3::new(0.0, 0.0, 1.0));
    let mut positions = source.clone();
    deform(&data, &moved(&target, lift), &mut positions, 1.0, None).expect("deform");
    assert_close(positions[0], lift.apply_point(source[0]), 1e-9);
    assert_eq!(positions[1], source[1]);
    assert_close(positions[2], lift.apply_point(source[2]), 1e-9);
    assert_eq!(positions[3], source[3]);
}

#[test]
fn topology_drift_is_reported() {
    let target = curved_grid();
    let source = vec![Point3::new(1.5, 1.5, 0.2)];
    let (data, _) = bind(&source, &target, &BindOptions::new()).expect("bind");

    let smaller = grid(4, |_, _| 0.0);
    let mut positions = source.clone();
    assert_eq!(
        deform(&data, &smaller, &mut positions, 1.0, None).unwrap_err(),
        DeformError::PolygonCountChanged { bound: 25, current: 16 }
    );
    assert_eq!(positions, source);
}

#[test]
fn bind_data_survives_binary_and_serde_round_trips() {
    let target = curved_grid();
    let mut rng = StdRng::seed_from_u64(99);
    let source = random_points(&mut rng, 40, 0.3, 4.7, 0.6);
    let options = BindOptions::new().with_target_name("cage");
    let (data, _) = bind(&source, &target, &options).expect("bind");

    let mut bytes = Vec::new();
    encode_bind_data(&data, &mut bytes).expect("encode");
    let decoded = decode_bind_data(&mut bytes.as_slice()).expect("decode");
    assert_eq!(decoded, data);

    let json = serde_json::to_string(&data).expect("serialize");
    let from_json: BindData = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(from_json.verts.len(), data.verts.len());
    assert_eq!(from_json.target_name, "cage");

    let warped = moved(&target, Transform::rotate_z(0.3));
    let mut a = source.clone();
    let mut b = source.clone();
    deform(&data, &warped, &mut a, 1.0, None).expect("deform");
    deform(&decoded, &warped, &mut b, 1.0, None).expect("deform");
    assert_eq!(a, b);
}

#[test]
fn malformed_serde_bind_data_is_rejected() {
    let target = curved_grid();
    let source = vec![Point3::new(1.4, 2.3, 0.3)];
    let (data, _) = bind(&source, &target, &BindOptions::new()).expect("bind");

    let mut value = serde_json::to_value(&data).expect("serialize");
    let record = &mut value["verts"][0]["binds"][0];
    record["mode"] = serde_json::json!("Triangle");
    record["vert_inds"] = serde_json::json!([0, 1]);
    record["vert_weights"] = serde_json::json!([0.5, 0.25, 0.25]);
    let broken: BindData = serde_json::from_value(value).expect("deserialize");

    let mut positions = source.clone();
    assert_eq!(
        deform(&broken, &target, &mut positions, 1.0, None).unwrap_err(),
        DeformError::MalformedBind { mode: "triangle", vertices: 2, weights: 3 }
    );
    assert_eq!(positions, source);
}
