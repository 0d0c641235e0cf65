//! Host implementation of the device kernels.

use nalgebra::Point2;

use super::ComputeDevice;
use crate::algo::eikmesh::{relax_cpu, RelaxProblem};
use crate::algo::eikonal::{fim_pass, CellGrid, FimPass, UpdateOrder};
use crate::error::DeviceError;

/// Runs the kernels on rayon, or on the calling thread when sequential.
#[derive(Debug, Clone)]
pub struct CpuDevice {
    parallel: bool,
    problem: Option<RelaxProblem>,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDevice {
    /// A parallel CPU device.
    pub fn new() -> Self {
        Self {
            parallel: true,
            problem: None,
        }
    }

    /// A CPU device that runs kernels on the calling thread.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            problem: None,
        }
    }
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> &str {
        "cpu"
    }

    fn upload_relax(&mut self, problem: &RelaxProblem) -> Result<(), DeviceError> {
        self.problem = Some(problem.clone());
        Ok(())
    }

    fn relax_steps(&mut self, steps: usize) -> Result<(), DeviceError> {
        let problem = self.problem.as_mut().ok_or(DeviceError::NotUploaded)?;
        for _ in 0..steps {
            problem.positions = relax_cpu(problem, self.parallel);
        }
        Ok(())
    }

    fn download_positions(&mut self) -> Result<Vec<Point2<f64>>, DeviceError> {
        self.problem
            .as_ref()
            .map(|p| p.positions.clone())
            .ok_or(DeviceError::NotUploaded)
    }

    fn fim_pass(
        &mut self,
        grid: &CellGrid,
        active: &[usize],
        order: UpdateOrder,
        tolerance: f64,
    ) -> Result<FimPass, DeviceError> {
        Ok(fim_pass(grid, active, order, tolerance, self.parallel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikmesh::{EikMesh, EikMeshOptions};
    use crate::geometry::{distance, Rect};

    fn problem() -> RelaxProblem {
        let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
        let mut eik = EikMesh::new(
            bounds,
            distance::rect(bounds),
            distance::uniform(1.0),
            EikMeshOptions::with_h0(0.25),
        )
        .unwrap();
        eik.initialize().unwrap();
        eik.relax_problem()
    }

    #[test]
    fn test_matches_direct_relaxation() {
        let problem = problem();
        let mut device = CpuDevice::new();
        device.upload_relax(&problem).unwrap();
        device.relax_steps(1).unwrap();
        assert_eq!(device.download_positions().unwrap(), relax_cpu(&problem, false));

        // Two device steps equal two host steps on the same topology
        device.relax_steps(1).unwrap();
        let mut host = problem.clone();
        host.positions = relax_cpu(&host, false);
        let twice = relax_cpu(&host, false);
        assert_eq!(device.download_positions().unwrap(), twice);
    }

    #[test]
    fn test_requires_upload() {
        let mut device = CpuDevice::sequential();
        assert!(matches!(device.relax_steps(1), Err(DeviceError::NotUploaded)));
        assert!(matches!(device.download_positions(), Err(DeviceError::NotUploaded)));
    }
}
