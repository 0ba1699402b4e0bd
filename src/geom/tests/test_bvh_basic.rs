use crate::geom::bvh::{Bvh, bbox_distance_squared_to_point};
use crate::geom::{BBox, Point3};

fn spread_boxes() -> Vec<BBox> {
    vec![
        BBox::new(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(11.0, 1.0, 1.0),
        ),
        BBox::new(
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 1.0),
        ),
        BBox::new(
            Point3::new(-5.0, 0.0, 0.0),
            Point3::new(-4.0, 1.0, 1.0),
        ),
    ]
}

#[test]
fn bvh_build_rejects_empty_input() {
    assert!(Bvh::build(&[]).is_none());
}

#[test]
fn bvh_nearest_finds_closest_primitive() {
    let bboxes = spread_boxes();
    let bvh = Bvh::build_with_leaf_size(&bboxes, 1).expect("bvh build");
    let point = Point3::new(0.0, 0.5, 0.5);

    let (idx, dist2) = bvh
        .nearest(point, f64::INFINITY, |prim_idx| {
            Some(bbox_distance_squared_to_point(bboxes[prim_idx], point))
        })
        .expect("nearest hit");

    assert_eq!(idx, 1);
    assert!((dist2 - 1.0).abs() < 1e-12);
}

#[test]
fn bvh_nearest_respects_initial_bound() {
    let bboxes = spread_boxes();
    let bvh = Bvh::build_with_leaf_size(&bboxes, 1).expect("bvh build");
    let point = Point3::new(0.0, 0.5, 0.5);

    let hit = bvh.nearest(point, 0.5, |prim_idx| {
        Some(bbox_distance_squared_to_point(bboxes[prim_idx], point))
    });
    assert!(hit.is_none());
}

#[test]
fn bvh_nearest_matches_brute_force_on_grid() {
    let mut bboxes = Vec::new();
    for i in 0..10 {
        for j in 0..10 {
            let min = Point3::new(f64::from(i) * 2.0, f64::from(j) * 2.0, 0.0);
            let max = Point3::new(min.x + 1.0, min.y + 1.0, 1.0);
            bboxes.push(BBox::new(min, max));
        }
    }
    let bvh = Bvh::build(&bboxes).expect("bvh build");

    for point in [
        Point3::new(7.3, 3.1, 4.0),
        Point3::new(-3.0, 25.0, 0.5),
        Point3::new(12.5, 12.5, -2.0),
    ] {
        let (idx, dist2) = bvh
            .nearest(point, f64::INFINITY, |prim| {
                Some(bbox_distance_squared_to_point(bboxes[prim], point))
            })
            .expect("nearest hit");

        let brute = bboxes
            .iter()
            .map(|b| bbox_distance_squared_to_point(*b, point))
            .fold(f64::INFINITY, f64::min);
        assert!((dist2 - brute).abs() < 1e-12, "idx {idx}");
    }
}
