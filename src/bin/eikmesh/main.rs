//! EikMesh CLI - adaptive meshing and travel-time fields.
//!
//! Usage: eikmesh <COMMAND> [OPTIONS]
//!
//! Run `eikmesh --help` for available commands. Set `RUST_LOG=debug` for
//! per-step logs.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Point2;

use eikmesh::algo::eikmesh::{EikMesh, EikMeshOptions, EikMeshResult, QualityStats};
use eikmesh::algo::eikonal::{
    build_solver, EikonalSolver, GridSolverOptions, SolverKind, UpdateOrder, MAX_GRID_NODES,
};
use eikmesh::algo::Progress;
use eikmesh::geometry::{distance, Domain, EdgeLengthFunction, Rect, Shape};
use eikmesh::gpu::{select_device, DeviceFimSolver, HybridEikMesh, HybridOptions};

#[derive(Parser)]
#[command(name = "eikmesh")]
#[command(author, version, about = "Adaptive meshing and Eikonal travel-time fields", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a mesh for a built-in domain and print statistics
    Mesh {
        /// Domain to mesh
        #[arg(short, long, value_enum, default_value = "square")]
        domain: BuiltinDomain,

        /// Base edge length
        #[arg(long, default_value = "0.1")]
        h0: f64,

        /// Grow edges away from the domain border by this factor
        #[arg(long)]
        grading: Option<f64>,

        /// Maximum relaxation steps
        #[arg(long, default_value = "100")]
        max_steps: usize,

        /// Minimum triangle quality for convergence
        #[arg(long, default_value = "0.5")]
        min_quality: f64,

        /// Run relaxation on a compute device
        #[arg(long)]
        hybrid: bool,

        /// Relaxation steps per device phase
        #[arg(long, default_value = "5")]
        device_steps: usize,

        /// Prefer a GPU device (requires the `gpu` feature)
        #[arg(long)]
        gpu: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Solve for travel times to a point target and print them at query points
    Solve {
        /// Solver: fmm, fsm, fim, mesh-fmm or mesh-fim
        #[arg(short, long, default_value = "fmm", value_parser = parse_solver)]
        solver: SolverKind,

        /// Domain width
        #[arg(long, default_value = "10.0")]
        width: f64,

        /// Domain height
        #[arg(long, default_value = "10.0")]
        height: f64,

        /// Target point as `x,y`
        #[arg(short, long, value_parser = parse_point)]
        target: Point2<f64>,

        /// Rectangular obstacle as `x0,y0,x1,y1` (repeatable)
        #[arg(short, long, value_parser = parse_rect)]
        obstacle: Vec<Rect>,

        /// Query point as `x,y` (repeatable)
        #[arg(short, long, value_parser = parse_point)]
        query: Vec<Point2<f64>>,

        /// Constant travel speed
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Grid spacing (grid solvers)
        #[arg(long, default_value = "0.1")]
        spacing: f64,

        /// Finite-difference order (grid solvers)
        #[arg(long, value_enum, default_value = "first")]
        order: OrderArg,

        /// Base edge length of the generated mesh (mesh solvers)
        #[arg(long, default_value = "0.25")]
        h0: f64,

        /// Run grid FIM passes on a compute device
        #[arg(long)]
        device: bool,

        /// Prefer a GPU device (requires the `gpu` feature)
        #[arg(long)]
        gpu: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Show build features and the selected compute device
    Info,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum BuiltinDomain {
    /// Unit square
    Square,
    /// Disc of radius 1
    Disc,
    /// 4 x 2 corridor around a circular pillar
    Corridor,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OrderArg {
    /// First-order upwind differences
    First,
    /// Second-order upwind differences where available
    Second,
}

impl From<OrderArg> for UpdateOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::First => UpdateOrder::First,
            OrderArg::Second => UpdateOrder::Second,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Mesh {
            domain,
            h0,
            grading,
            max_steps,
            min_quality,
            hybrid,
            device_steps,
            gpu,
            sequential,
        } => {
            let options = EikMeshOptions::with_h0(h0)
                .with_max_steps(max_steps)
                .with_min_quality(min_quality)
                .with_parallel(!sequential);
            let hybrid = hybrid.then(|| {
                HybridOptions::default()
                    .with_device_steps(device_steps)
                    .with_prefer_gpu(gpu)
            });
            cmd_mesh(domain, grading, options, hybrid)?;
        }

        Commands::Solve {
            solver,
            width,
            height,
            target,
            obstacle,
            query,
            speed,
            spacing,
            order,
            h0,
            device,
            gpu,
            sequential,
        } => {
            let mut domain = Domain::new(Rect::new(0.0, 0.0, width, height)).with_target(Shape::Point(target));
            for rect in obstacle {
                domain = domain.with_obstacle(rect);
            }
            let mut options = GridSolverOptions::with_spacing(spacing).with_order(order.into());
            if sequential {
                options = options.sequential();
            }
            let device = device.then(|| HybridOptions::default().with_prefer_gpu(gpu));
            cmd_solve(solver, &domain, speed, options, h0, device, &query)?;
        }

        Commands::Info => cmd_info(),
    }

    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Monotonic: the step cap is a bound, convergence usually comes earlier
        let (percent, increased) = loop {
            let old_max = max_percent.load(Ordering::Relaxed);
            let new_max = old_max.max(raw_percent);
            if new_max == old_max {
                break (old_max, false);
            }
            match max_percent.compare_exchange_weak(old_max, new_max, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break (new_max, true),
                Err(_) => continue,
            }
        };

        if !increased && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);
        eprint!("\r[{}{}] {:3}% {}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn builtin_domain(domain: BuiltinDomain) -> Domain {
    match domain {
        BuiltinDomain::Square => Domain::new(Rect::new(0.0, 0.0, 1.0, 1.0)),
        BuiltinDomain::Disc => Domain::new(Rect::new(-1.0, -1.0, 1.0, 1.0)),
        BuiltinDomain::Corridor => Domain::new(Rect::new(0.0, 0.0, 4.0, 2.0)).with_obstacle(Shape::Circle {
            center: Point2::new(2.0, 1.0),
            radius: 0.5,
        }),
    }
}

fn cmd_mesh(
    which: BuiltinDomain,
    grading: Option<f64>,
    options: EikMeshOptions,
    hybrid: Option<HybridOptions>,
) -> Result<(), Box<dyn std::error::Error>> {
    let domain = builtin_domain(which);
    let distance_fn = match which {
        BuiltinDomain::Disc => distance::circle(Point2::origin(), 1.0),
        _ => domain.distance_function(),
    };
    let edge_length: EdgeLengthFunction = match grading {
        Some(growth) => distance::graded(Arc::clone(&distance_fn), 1.0, growth / options.h0),
        None => distance::uniform(1.0),
    };

    let mode = if options.parallel { "parallel" } else { "sequential" };
    let steps = options.max_steps;
    let generator = EikMesh::new(domain.bounds, distance_fn, edge_length, options)?;
    let progress = create_progress();

    let start = Instant::now();
    let result: EikMeshResult = match hybrid {
        Some(hybrid) => {
            let driver = HybridEikMesh::new(generator, hybrid);
            println!("Meshing with device '{}' (up to {} cycles)...", driver.device_name(), steps);
            driver.generate_with_progress(&progress)?
        }
        None => {
            println!("Meshing (up to {} steps, {})...", steps, mode);
            generator.generate_with_progress(&progress)?
        }
    };
    let elapsed = start.elapsed();

    let mesh = &result.mesh;
    println!("Vertices: {}", mesh.num_vertices());
    println!("Triangles: {}", mesh.num_triangles());
    println!("Holes: {}", mesh.hole_faces().count());
    println!("Steps: {} ({})", result.steps, if result.converged { "converged" } else { "step cap" });
    println!(
        "Quality: min={:.4}, mean={:.4}, min angle={:.2} deg",
        result.quality.min,
        result.quality.mean,
        result.quality.min_angle.to_degrees()
    );
    let histogram = QualityStats::histogram(mesh, 10);
    println!("Quality histogram:");
    for (i, count) in histogram.iter().enumerate() {
        println!("  [{:.1}, {:.1}): {}", i as f64 / 10.0, (i + 1) as f64 / 10.0, count);
    }
    println!("Elapsed: {:.2?}", elapsed);

    Ok(())
}

fn cmd_solve(
    kind: SolverKind,
    domain: &Domain,
    speed: f64,
    options: GridSolverOptions,
    h0: f64,
    device: Option<HybridOptions>,
    queries: &[Point2<f64>],
) -> Result<(), Box<dyn std::error::Error>> {
    let speed_fn = distance::constant_speed(speed);

    let mesh = if kind.needs_mesh() {
        println!("Meshing the free space (h0={})...", h0);
        let options = EikMeshOptions::with_h0(h0).with_parallel(options.parallel);
        let result = eikmesh::algo::eikmesh::generate(domain, distance::uniform(1.0), options)?;
        println!(
            "Mesh: {} vertices, {} triangles, min quality {:.3}",
            result.mesh.num_vertices(),
            result.mesh.num_triangles(),
            result.quality.min
        );
        Some(Arc::new(result.mesh))
    } else {
        None
    };

    let mut solver: Box<dyn EikonalSolver> = match device {
        Some(hybrid) if kind == SolverKind::GridFim => {
            Box::new(DeviceFimSolver::new(domain, speed_fn.as_ref(), options, &hybrid)?)
        }
        Some(_) => {
            eprintln!("Warning: --device only applies to the fim solver; ignoring");
            build_solver(kind, domain, Arc::clone(&speed_fn), &options, mesh)?
        }
        None => build_solver(kind, domain, Arc::clone(&speed_fn), &options, mesh)?,
    };

    println!("Solving with {}...", solver.name());
    let start = Instant::now();
    let report = solver.solve()?;
    let elapsed = start.elapsed();
    println!(
        "Done: {} iterations, {} updates, {} ({:.2?})",
        report.iterations,
        report.updates,
        if report.converged { "converged" } else { "iteration cap" },
        elapsed
    );

    for q in queries {
        let t = solver.potential(q);
        let g = solver.gradient(q);
        if t.is_finite() {
            println!("T({:.3}, {:.3}) = {:.6}  grad = ({:.4}, {:.4})", q.x, q.y, t, g.x, g.y);
        } else {
            println!("T({:.3}, {:.3}) = unreachable", q.x, q.y);
        }
    }

    Ok(())
}

fn cmd_info() {
    println!("eikmesh {}", env!("CARGO_PKG_VERSION"));
    println!("GPU support: {}", if cfg!(feature = "gpu") { "enabled" } else { "disabled" });
    println!("Rayon threads: {}", rayon::current_num_threads());
    println!("Grid node limit: {}", MAX_GRID_NODES);
    let device = select_device(cfg!(feature = "gpu"));
    println!("Compute device: {}", device.name());
}

fn parse_solver(s: &str) -> Result<SolverKind, String> {
    s.parse().map_err(|e: eikmesh::error::ConfigError| e.to_string())
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated numbers, got '{}'", N, s));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| format!("invalid number '{}'", part))?;
    }
    Ok(out)
}

fn parse_point(s: &str) -> Result<Point2<f64>, String> {
    let [x, y] = parse_numbers::<2>(s)?;
    Ok(Point2::new(x, y))
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let [x0, y0, x1, y1] = parse_numbers::<4>(s)?;
    Ok(Rect::new(x0, y0, x1, y1))
}
