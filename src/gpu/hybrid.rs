//! Drivers alternating device kernels with host-side mesh and grid work.

use std::sync::Mutex;

use nalgebra::{Point2, Vector2};

use super::{select_device, ComputeDevice, CpuDevice, PhaseProtocol};
use crate::algo::eikmesh::{EikMesh, EikMeshResult, EikMeshState, RelaxProblem, StepStats};
use crate::algo::eikonal::{
    iterate_with, CellGrid, EikonalSolver, FieldCache, FimPass, GridSolverOptions, PotentialField, SolveReport,
};
use crate::algo::Progress;
use crate::error::{DeviceError, Result};
use crate::geometry::Domain;

/// Options for [`HybridEikMesh`] and [`DeviceFimSolver`].
#[derive(Debug, Clone)]
pub struct HybridOptions {
    /// Relaxation steps run on the device between host synchronizations.
    pub device_steps: usize,
    /// Try a GPU device before the CPU one.
    pub prefer_gpu: bool,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            device_steps: 5,
            prefer_gpu: cfg!(feature = "gpu"),
        }
    }
}

impl HybridOptions {
    /// Set the number of device steps per cycle.
    pub fn with_device_steps(mut self, steps: usize) -> Self {
        self.device_steps = steps.max(1);
        self
    }

    /// Prefer or skip the GPU device.
    pub fn with_prefer_gpu(mut self, prefer_gpu: bool) -> Self {
        self.prefer_gpu = prefer_gpu;
        self
    }
}

/// EikMesh with relaxation offloaded to a [`ComputeDevice`].
///
/// Each cycle uploads the flattened mesh, runs `device_steps` relaxation
/// steps on the device, synchronizes the positions back, then projects,
/// repairs and legalizes on the host. A device failure switches to the CPU
/// device for the rest of the run.
pub struct HybridEikMesh {
    eikmesh: EikMesh,
    device: Box<dyn ComputeDevice>,
    protocol: PhaseProtocol,
    options: HybridOptions,
}

impl std::fmt::Debug for HybridEikMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridEikMesh")
            .field("eikmesh", &self.eikmesh)
            .field("device", &self.device.name())
            .field("protocol", &self.protocol)
            .field("options", &self.options)
            .finish()
    }
}

impl HybridEikMesh {
    /// Wrap `eikmesh`, choosing a device with [`select_device`].
    pub fn new(eikmesh: EikMesh, options: HybridOptions) -> Self {
        let device = select_device(options.prefer_gpu);
        Self::with_device(eikmesh, device, options)
    }

    /// Wrap `eikmesh` with an explicit device.
    pub fn with_device(eikmesh: EikMesh, device: Box<dyn ComputeDevice>, options: HybridOptions) -> Self {
        Self {
            eikmesh,
            device,
            protocol: PhaseProtocol::new(),
            options,
        }
    }

    /// Name of the device in use.
    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// The wrapped generator.
    pub fn eikmesh(&self) -> &EikMesh {
        &self.eikmesh
    }

    /// Host/device cycles completed.
    pub fn cycles(&self) -> usize {
        self.protocol.cycles()
    }

    /// Run one device phase and one host phase.
    pub fn cycle(&mut self) -> Result<StepStats> {
        self.eikmesh.initialize()?;
        if self.eikmesh.state() == EikMeshState::Converged {
            return self.eikmesh.step();
        }
        let problem = self.eikmesh.relax_problem();
        let targets = match self.relax_on_device(&problem) {
            Ok(targets) => targets,
            Err(err) => {
                tracing::warn!(
                    device = self.device.name(),
                    error = %err,
                    "device relaxation failed; continuing on CPU"
                );
                self.device = Box::new(CpuDevice::new());
                self.protocol.abort();
                self.relax_on_device(&problem)?
            }
        };
        self.protocol.begin_sequential()?;
        Ok(self.eikmesh.finish_step(&problem.positions, &targets))
    }

    fn relax_on_device(&mut self, problem: &RelaxProblem) -> std::result::Result<Vec<Point2<f64>>, DeviceError> {
        self.protocol.begin_parallel()?;
        self.device.upload_relax(problem)?;
        self.device.relax_steps(self.options.device_steps)?;
        self.protocol.barrier()?;
        let positions = self.device.download_positions()?;
        if positions.len() != problem.len() {
            return Err(DeviceError::Readback(format!(
                "expected {} positions, got {}",
                problem.len(),
                positions.len()
            )));
        }
        tracing::trace!(
            device = self.device.name(),
            steps = self.options.device_steps,
            "device relaxation synchronized"
        );
        Ok(positions)
    }

    /// Run cycles until convergence or the step cap. Each cycle counts as
    /// one step.
    pub fn generate(self) -> Result<EikMeshResult> {
        self.generate_internal(None)
    }

    /// As [`generate`](Self::generate), reporting each cycle.
    pub fn generate_with_progress(self, progress: &Progress) -> Result<EikMeshResult> {
        self.generate_internal(Some(progress))
    }

    fn generate_internal(mut self, progress: Option<&Progress>) -> Result<EikMeshResult> {
        let max_steps = self.eikmesh.options().max_steps;
        let total = max_steps + 1;
        if let Some(p) = progress {
            p.report(0, total, "Uniform refinement");
        }
        self.eikmesh.initialize()?;
        while self.eikmesh.steps() < max_steps && self.eikmesh.state() != EikMeshState::Converged {
            self.cycle()?;
            if let Some(p) = progress {
                p.report(self.eikmesh.steps(), total, "Relaxing");
            }
        }
        self.protocol.finish()?;
        if let Some(p) = progress {
            p.report(total, total, "EikMesh complete");
        }
        tracing::debug!(device = self.device.name(), cycles = self.protocol.cycles(), "hybrid run finished");
        Ok(self.eikmesh.finish())
    }
}

/// Grid Fast Iterative Method with passes run on a [`ComputeDevice`].
///
/// The host applies each pass and rebuilds the active list between device
/// phases. If the device fails, the solve restarts on the CPU device.
pub struct DeviceFimSolver {
    options: GridSolverOptions,
    seeded: CellGrid,
    grid: CellGrid,
    device: Mutex<Box<dyn ComputeDevice>>,
    solved: bool,
    report: SolveReport,
}

impl std::fmt::Debug for DeviceFimSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFimSolver")
            .field("options", &self.options)
            .field("nodes", &self.grid.len())
            .field("solved", &self.solved)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl DeviceFimSolver {
    /// Rasterize `domain` and pick a device with [`select_device`].
    pub fn new<S>(domain: &Domain, speed: &S, options: GridSolverOptions, hybrid: &HybridOptions) -> Result<Self>
    where
        S: Fn(&Point2<f64>) -> f64 + ?Sized,
    {
        Self::with_device(domain, speed, options, select_device(hybrid.prefer_gpu))
    }

    /// Rasterize `domain` and run passes on `device`.
    pub fn with_device<S>(
        domain: &Domain,
        speed: &S,
        options: GridSolverOptions,
        device: Box<dyn ComputeDevice>,
    ) -> Result<Self>
    where
        S: Fn(&Point2<f64>) -> f64 + ?Sized,
    {
        options.validate()?;
        let grid = CellGrid::from_domain(domain, speed, options.spacing, options.effective_init_radius())?;
        Ok(Self {
            options,
            seeded: grid.clone(),
            grid,
            device: Mutex::new(device),
            solved: false,
            report: SolveReport::default(),
        })
    }

    /// The grid, solved or not.
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    /// Counters from the last solve.
    pub fn report(&self) -> SolveReport {
        self.report
    }

    /// Name of the device in use.
    pub fn device_name(&self) -> String {
        match self.device.lock() {
            Ok(device) => device.name().to_owned(),
            Err(_) => "poisoned".to_owned(),
        }
    }

    fn run(&mut self) -> std::result::Result<SolveReport, DeviceError> {
        let o = &self.options;
        let device = self.device.get_mut().map_err(|_| DeviceError::Kernel("device lock poisoned".into()))?;
        let mut protocol = PhaseProtocol::new();
        self.grid = self.seeded.clone();
        let pass = |grid: &CellGrid, active: &[usize]| -> std::result::Result<FimPass, DeviceError> {
            protocol.begin_parallel()?;
            let pass = device.fim_pass(grid, active, o.order, o.tolerance)?;
            protocol.barrier()?;
            protocol.begin_sequential()?;
            Ok(pass)
        };
        let report = iterate_with(&mut self.grid, o.order, o.tolerance, o.max_iterations, pass)?;
        protocol.finish()?;
        Ok(report)
    }
}

impl EikonalSolver for DeviceFimSolver {
    fn name(&self) -> &'static str {
        "device-fim"
    }

    fn solve(&mut self) -> Result<SolveReport> {
        let _span = tracing::debug_span!("device_fim_solve").entered();
        self.report = match self.run() {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "device pass failed; solving on CPU");
                self.device = Mutex::new(Box::new(CpuDevice::new()));
                self.run()?
            }
        };
        self.solved = true;
        tracing::info!(
            method = self.name(),
            device = %self.device_name(),
            nodes = self.grid.len(),
            converged = self.report.converged,
            "eikonal solve finished"
        );
        Ok(self.report)
    }

    fn is_solved(&self) -> bool {
        self.solved
    }

    fn potential(&self, p: &Point2<f64>) -> f64 {
        if !self.solved {
            return f64::INFINITY;
        }
        PotentialField::potential(&self.grid, p)
    }

    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64> {
        if !self.solved {
            return Vector2::zeros();
        }
        PotentialField::gradient(&self.grid, p)
    }

    fn values(&self) -> &[f64] {
        self.grid.potentials()
    }

    fn load_cached_field(&mut self, cache: &dyn FieldCache, handle: &str) -> bool {
        let Some(values) = cache.load(handle) else {
            return false;
        };
        let mut grid = self.seeded.clone();
        if !grid.restore(&values) {
            tracing::warn!(handle, expected = grid.len(), found = values.len(), "cached field has the wrong size");
            return false;
        }
        self.grid = grid;
        self.solved = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikmesh::EikMeshOptions;
    use crate::algo::eikonal::{GridMethod, GridSolver, UpdateOrder};
    use crate::geometry::{distance, Rect, Shape};

    /// Fails every kernel launch.
    struct BrokenDevice;

    impl ComputeDevice for BrokenDevice {
        fn name(&self) -> &str {
            "broken"
        }

        fn upload_relax(&mut self, _problem: &RelaxProblem) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn relax_steps(&mut self, _steps: usize) -> std::result::Result<(), DeviceError> {
            Err(DeviceError::Kernel("lost device".into()))
        }

        fn download_positions(&mut self) -> std::result::Result<Vec<Point2<f64>>, DeviceError> {
            Err(DeviceError::NotUploaded)
        }

        fn fim_pass(
            &mut self,
            _grid: &CellGrid,
            _active: &[usize],
            _order: UpdateOrder,
            _tolerance: f64,
        ) -> std::result::Result<FimPass, DeviceError> {
            Err(DeviceError::Kernel("lost device".into()))
        }
    }

    fn generator(max_steps: usize) -> EikMesh {
        let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
        let options = EikMeshOptions::with_h0(0.2).with_max_steps(max_steps).sequential();
        EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options).unwrap()
    }

    fn domain() -> Domain {
        Domain::new(Rect::new(0.0, 0.0, 5.0, 5.0))
            .with_obstacle(Rect::new(1.0, 2.0, 4.0, 2.5))
            .with_target(Shape::Point(Point2::new(2.5, 0.5)))
    }

    #[test]
    fn test_single_device_step_matches_plain_relaxation() {
        let mut plain = generator(4);
        let options = HybridOptions::default().with_device_steps(1).with_prefer_gpu(false);
        let mut hybrid = HybridEikMesh::with_device(generator(4), Box::new(CpuDevice::sequential()), options);
        for _ in 0..4 {
            let a = plain.step().unwrap();
            let b = hybrid.cycle().unwrap();
            assert_eq!(a, b);
        }
        assert_eq!(hybrid.cycles(), hybrid.eikmesh().steps());
        let positions = |m: &EikMesh| m.mesh().vertices().map(|(_, v)| v.position).collect::<Vec<_>>();
        assert_eq!(positions(&plain), positions(hybrid.eikmesh()));
    }

    #[test]
    fn test_broken_device_falls_back_to_cpu() {
        let options = HybridOptions::default().with_device_steps(3).with_prefer_gpu(false);
        let hybrid = HybridEikMesh::with_device(generator(10), Box::new(BrokenDevice), options);
        assert_eq!(hybrid.device_name(), "broken");
        let result = hybrid.generate().unwrap();
        assert!(result.steps > 0);
        assert!(result.quality.min > 0.0);
    }

    #[test]
    fn test_device_fim_matches_grid_fim() {
        let options = GridSolverOptions::with_spacing(0.25).sequential();
        let speed = |_: &Point2<f64>| 1.0;
        let mut reference = GridSolver::new(GridMethod::Fim, &domain(), &speed, options.clone()).unwrap();
        reference.solve().unwrap();

        let mut device = DeviceFimSolver::with_device(&domain(), &speed, options, Box::new(CpuDevice::sequential())).unwrap();
        assert_eq!(device.potential(&Point2::new(1.0, 1.0)), f64::INFINITY);
        let report = device.solve().unwrap();
        assert!(report.converged);
        assert_eq!(report, reference.report());
        assert_eq!(device.values(), reference.values());
    }

    #[test]
    fn test_device_fim_recovers_from_broken_device() {
        let options = GridSolverOptions::with_spacing(0.25);
        let speed = |_: &Point2<f64>| 1.0;
        let mut solver = DeviceFimSolver::with_device(&domain(), &speed, options, Box::new(BrokenDevice)).unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.device_name(), "cpu");
        let t = solver.potential(&Point2::new(2.5, 4.5));
        // Detour around the wall is longer than the straight line
        assert!(t > 4.0 && t.is_finite(), "{t}");
    }
}
