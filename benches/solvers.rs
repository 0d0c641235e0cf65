//! Benchmarks for triangulation, mesh generation and Eikonal solvers.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use eikmesh::algo::eikmesh::relax_cpu;
use eikmesh::geometry::distance;
use eikmesh::prelude::*;
use nalgebra::Point2;

fn scattered_points(n: usize) -> Vec<Point2<f64>> {
    // Deterministic low-discrepancy sequence
    (0..n)
        .map(|i| {
            let x = (i as f64 * 0.754_877_666_246_692_8).fract();
            let y = (i as f64 * 0.569_840_290_998_053_2).fract();
            Point2::new(0.01 + 0.98 * x, 0.01 + 0.98 * y)
        })
        .collect()
}

fn obstacle_domain() -> Domain {
    Domain::new(Rect::new(0.0, 0.0, 10.0, 10.0))
        .with_obstacle(Rect::new(2.0, 6.0, 8.0, 7.0))
        .with_obstacle(Shape::Circle {
            center: Point2::new(5.0, 3.0),
            radius: 1.0,
        })
        .with_target(Shape::Point(Point2::new(5.0, 9.0)))
}

fn bench_triangulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("delaunay_insert");
    for n in [1_000, 10_000] {
        let points = scattered_points(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| Triangulation::from_points(Rect::new(0.0, 0.0, 1.0, 1.0), points).unwrap());
        });
    }
    group.finish();
}

fn bench_eikmesh(c: &mut Criterion) {
    let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);

    c.bench_function("eikmesh_square_h0.05_20_steps", |b| {
        b.iter(|| {
            let options = EikMeshOptions::with_h0(0.05).with_max_steps(20);
            EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options)
                .unwrap()
                .generate()
                .unwrap()
        });
    });

    let mut generator = EikMesh::new(
        bounds,
        distance::rect(bounds),
        distance::uniform(1.0),
        EikMeshOptions::with_h0(0.02),
    )
    .unwrap();
    generator.initialize().unwrap();
    let problem = generator.relax_problem();
    c.bench_function("relax_step_parallel", |b| b.iter(|| relax_cpu(&problem, true)));
    c.bench_function("relax_step_sequential", |b| b.iter(|| relax_cpu(&problem, false)));
}

fn bench_grid_solvers(c: &mut Criterion) {
    let domain = obstacle_domain();
    let speed = |_: &Point2<f64>| 1.0;
    let mut group = c.benchmark_group("grid_solve_h0.05");
    for (name, method) in [("fmm", GridMethod::Fmm), ("fsm", GridMethod::Fsm), ("fim", GridMethod::Fim)] {
        group.bench_function(name, |b| {
            b.iter_with_setup(
                || GridSolver::new(method, &domain, &speed, GridSolverOptions::with_spacing(0.05)).unwrap(),
                |mut solver| solver.solve().unwrap(),
            );
        });
    }
    group.finish();
}

fn bench_mesh_solvers(c: &mut Criterion) {
    let domain = obstacle_domain();
    let options = EikMeshOptions::with_h0(0.2).with_max_steps(30);
    let mesh = Arc::new(
        eikmesh::algo::eikmesh::generate(&domain, distance::uniform(1.0), options)
            .unwrap()
            .mesh,
    );
    let speed = distance::constant_speed(1.0);

    let mut group = c.benchmark_group("mesh_solve_h0.2");
    for (name, method) in [("fmm", MeshMethod::Fmm), ("fim", MeshMethod::Fim)] {
        group.bench_function(name, |b| {
            b.iter_with_setup(
                || {
                    MeshSolver::new(
                        method,
                        Arc::clone(&mesh),
                        &domain,
                        Arc::clone(&speed),
                        MeshSolverOptions::default(),
                    )
                    .unwrap()
                },
                |mut solver| solver.solve().unwrap(),
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_triangulation,
    bench_eikmesh,
    bench_grid_solvers,
    bench_mesh_solvers
);
criterion_main!(benches);
