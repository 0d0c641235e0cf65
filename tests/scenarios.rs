//! End-to-end scenarios through the public API.

use std::sync::Arc;

use approx::assert_relative_eq;
use eikmesh::algo::eikmesh::relax_cpu;
use eikmesh::algo::eikonal::{FieldCache, MemoryCache};
use eikmesh::geometry::distance;
use eikmesh::gpu::{ComputeDevice, CpuDevice, HybridEikMesh, HybridOptions, PhaseProtocol};
use eikmesh::prelude::*;
use nalgebra::Point2;

fn open_square() -> Domain {
    Domain::new(Rect::new(0.0, 0.0, 10.0, 10.0)).with_target(Shape::Point(Point2::new(5.0, 5.0)))
}

// The 0.05 tolerance on the corner value needs second-order updates with a
// wider exact-initialization disc; first order overestimates by about h.
#[test]
fn fmm_corner_of_ten_by_ten_square() {
    let options = GridSolverOptions::with_spacing(0.25)
        .with_order(UpdateOrder::Second)
        .with_init_radius(2.0);
    let mut solver = build_solver(SolverKind::GridFmm, &open_square(), distance::constant_speed(1.0), &options, None).unwrap();
    solver.solve().unwrap();

    assert_relative_eq!(solver.potential(&Point2::new(0.0, 0.0)), 50f64.sqrt(), epsilon = 0.05);
    assert_relative_eq!(solver.potential(&Point2::new(5.0, 5.0)), 0.0);
}

#[test]
fn fmm_corner_with_default_options() {
    let mut solver = build_solver(
        SolverKind::GridFmm,
        &open_square(),
        distance::constant_speed(1.0),
        &GridSolverOptions::default(),
        None,
    )
    .unwrap();
    solver.solve().unwrap();

    // First order at h = 0.1 lands about 0.12 above the exact value
    let t = solver.potential(&Point2::new(0.0, 0.0));
    assert!(t >= 50f64.sqrt() && t - 50f64.sqrt() < 0.15, "{t}");
}

#[test]
fn every_point_target_is_a_source() {
    let domain = Domain::new(Rect::new(0.0, 0.0, 10.0, 10.0))
        .with_target(Shape::Point(Point2::new(1.0, 1.0)))
        .with_target(Shape::Point(Point2::new(8.3, 8.3)));
    let options = GridSolverOptions::with_spacing(1.0).with_init_radius(0.0);
    for kind in [SolverKind::GridFmm, SolverKind::GridFsm, SolverKind::GridFim] {
        let mut solver = build_solver(kind, &domain, distance::constant_speed(1.0), &options, None).unwrap();
        solver.solve().unwrap();

        assert_eq!(solver.potential(&Point2::new(1.0, 1.0)), 0.0);
        let near = solver.potential(&Point2::new(8.3, 8.3));
        assert!(near < 1.5, "{kind:?}: {near}");
        assert_relative_eq!(solver.potential(&Point2::new(8.0, 8.0)), 0.3 * 2f64.sqrt(), epsilon = 1e-12);
    }
}

#[test]
fn axis_distances_are_exact_for_unit_speed() {
    for kind in [SolverKind::GridFmm, SolverKind::GridFsm, SolverKind::GridFim] {
        let options = GridSolverOptions::with_spacing(0.5);
        let mut solver = build_solver(kind, &open_square(), distance::constant_speed(1.0), &options, None).unwrap();
        solver.solve().unwrap();
        for x in [0.0, 1.5, 8.0, 10.0] {
            let t = solver.potential(&Point2::new(x, 5.0));
            assert_relative_eq!(t, (x - 5.0f64).abs(), epsilon = 1e-6);
        }
    }
}

#[test]
fn fully_separating_wall_leaves_source_side_unreachable() {
    let domain = open_square().with_obstacle(Rect::new(-1.0, 2.0, 11.0, 3.0));
    let options = GridSolverOptions::with_spacing(0.25);
    let mut solver = build_solver(SolverKind::GridFmm, &domain, distance::constant_speed(1.0), &options, None).unwrap();
    solver.solve().unwrap();

    for x in [0.0, 2.5, 5.0, 9.75] {
        for y in [0.0, 1.0, 1.75] {
            assert!(solver.potential(&Point2::new(x, y)).is_infinite(), "({x}, {y})");
        }
    }
    assert!(solver.potential(&Point2::new(5.0, 9.0)).is_finite());
}

#[test]
fn marching_and_sweeping_agree_around_obstacles() {
    let domain = open_square()
        .with_obstacle(Rect::new(1.0, 7.0, 9.0, 7.5))
        .with_obstacle(Shape::Circle {
            center: Point2::new(3.0, 3.0),
            radius: 1.0,
        });
    let speed: eikmesh::geometry::TimeCostFunction = Arc::new(|p: &Point2<f64>| 1.0 + 0.1 * p.x);
    let options = GridSolverOptions::with_spacing(0.2).with_tolerance(1e-10);

    let mut fmm = build_solver(SolverKind::GridFmm, &domain, Arc::clone(&speed), &options, None).unwrap();
    let mut fsm = build_solver(SolverKind::GridFsm, &domain, Arc::clone(&speed), &options, None).unwrap();
    fmm.solve().unwrap();
    assert!(fsm.solve().unwrap().converged);

    for (a, b) in fmm.values().iter().zip(fsm.values()) {
        if a.is_finite() {
            assert!((a - b).abs() <= 1e-2 * a.max(1.0), "{a} vs {b}");
        } else {
            assert!(b.is_infinite());
        }
    }
}

#[test]
fn region_target_is_zero_inside() {
    let domain = Domain::new(Rect::new(0.0, 0.0, 10.0, 4.0)).with_target(Rect::new(9.0, 0.0, 10.0, 4.0));
    let options = GridSolverOptions::with_spacing(0.25);
    let mut solver = build_solver(SolverKind::GridFmm, &domain, distance::constant_speed(2.0), &options, None).unwrap();
    solver.solve().unwrap();

    assert_eq!(solver.potential(&Point2::new(9.5, 2.0)), 0.0);
    // Plane wave from the strip edge at half the distance per unit time
    assert_relative_eq!(solver.potential(&Point2::new(1.0, 2.0)), 4.0, epsilon = 1e-9);
    let g = solver.gradient(&Point2::new(4.0, 2.0));
    assert_relative_eq!(g.x, -0.5, epsilon = 1e-6);
    assert_relative_eq!(g.y, 0.0, epsilon = 1e-6);
}

#[test]
fn eikmesh_unit_square_reaches_quality() {
    let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
    let options = EikMeshOptions::with_h0(0.1).with_max_steps(60).with_min_quality(0.5);
    let result = EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options)
        .unwrap()
        .generate()
        .unwrap();

    assert!(result.quality.min >= 0.5, "min quality {}", result.quality.min);
    assert!(result.mesh.is_valid());
}

#[test]
fn eikmesh_curved_border_lies_on_zero_level_set() {
    let domain = Domain::new(Rect::new(0.0, 0.0, 4.0, 4.0)).with_obstacle(Shape::Circle {
        center: Point2::new(2.0, 2.0),
        radius: 0.8,
    });
    let h0 = 0.2;
    let result = eikmesh::algo::eikmesh::generate(&domain, distance::uniform(1.0), EikMeshOptions::with_h0(h0))
        .unwrap();

    assert!(result.converged, "stopped after {} steps", result.steps);
    assert!(result.quality.min > 0.1);
    let mesh = &result.mesh;
    assert!(mesh.is_valid());
    assert!(mesh.hole_faces().count() >= 1);

    let d = domain.distance_function();
    for (v, vertex) in mesh.vertices() {
        if mesh.is_boundary_vertex(v) && !vertex.fixed {
            assert!(d(&vertex.position).abs() <= 1e-3 * h0, "{:?} at {}", v, vertex.position);
        }
    }
    // Chords of the circle cut off slightly less than the disc
    let free_area = 16.0 - std::f64::consts::PI * 0.64;
    assert!((mesh.interior_area() - free_area).abs() < 0.1, "{}", mesh.interior_area());
}

#[test]
fn mesh_fast_marching_matches_euclidean_distance() {
    let domain = Domain::new(Rect::new(0.0, 0.0, 4.0, 4.0)).with_target(Shape::Point(Point2::new(1.0, 1.0)));
    let options = EikMeshOptions::with_h0(0.2).with_max_steps(40);
    let mesh = Arc::new(
        eikmesh::algo::eikmesh::generate(&domain, distance::uniform(1.0), options)
            .unwrap()
            .mesh,
    );
    let mut solver = build_solver(
        SolverKind::MeshFmm,
        &domain,
        distance::constant_speed(1.0),
        &GridSolverOptions::default(),
        Some(Arc::clone(&mesh)),
    )
    .unwrap();
    solver.solve().unwrap();

    let source = Point2::new(1.0, 1.0);
    for (v, vertex) in mesh.vertices() {
        let expected = (vertex.position - source).norm();
        let t = solver.values()[v.index()];
        assert!((t - expected).abs() < 0.1 * expected.max(1.0), "{t} vs {expected}");
    }
}

#[test]
fn cached_field_restores_solution() {
    let cache = MemoryCache::new();
    let options = GridSolverOptions::with_spacing(0.5);
    let speed = distance::constant_speed(1.0);

    let mut solved = build_solver(SolverKind::GridFim, &open_square(), Arc::clone(&speed), &options, None).unwrap();
    solved.solve().unwrap();
    assert!(solved.save_field_to_cache(&cache, "open-square"));
    assert_eq!(cache.load("open-square").map(|v| v.len()), Some(solved.values().len()));

    let mut restored = build_solver(SolverKind::GridFim, &open_square(), speed, &options, None).unwrap();
    assert!(restored.load_cached_field(&cache, "open-square"));
    let q = Point2::new(2.2, 7.9);
    assert_eq!(restored.potential(&q), solved.potential(&q));
}

#[test]
fn cpu_device_matches_direct_relaxation() {
    let bounds = Rect::new(0.0, 0.0, 2.0, 1.0);
    let mut generator = EikMesh::new(
        bounds,
        distance::rect(bounds),
        distance::uniform(1.0),
        EikMeshOptions::with_h0(0.15),
    )
    .unwrap();
    generator.initialize().unwrap();
    let problem = generator.relax_problem();

    let mut device = CpuDevice::new();
    device.upload_relax(&problem).unwrap();
    device.relax_steps(1).unwrap();
    assert_eq!(device.download_positions().unwrap(), relax_cpu(&problem, true));
}

#[test]
fn hybrid_driver_produces_valid_mesh() {
    let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
    let generator = EikMesh::new(
        bounds,
        distance::rect(bounds),
        distance::uniform(1.0),
        EikMeshOptions::with_h0(0.1).with_max_steps(40).with_min_quality(0.5),
    )
    .unwrap();
    let options = HybridOptions::default().with_device_steps(2).with_prefer_gpu(false);
    let driver = HybridEikMesh::with_device(generator, Box::new(CpuDevice::new()), options);
    let result = driver.generate().unwrap();

    assert!(result.mesh.is_valid());
    assert!(result.quality.min > 0.2, "min quality {}", result.quality.min);
}

#[test]
fn phase_protocol_rejects_out_of_order_steps() {
    let mut protocol = PhaseProtocol::new();
    assert!(protocol.begin_sequential().is_err());
    protocol.begin_parallel().unwrap();
    assert!(matches!(
        protocol.begin_sequential(),
        Err(DeviceError::PhaseViolation { .. })
    ));
    protocol.barrier().unwrap();
    protocol.begin_sequential().unwrap();
    protocol.finish().unwrap();
}
