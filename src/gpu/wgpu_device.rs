//! WGSL compute kernels on wgpu.
//!
//! Both kernels work in single precision. Relaxation positions are uploaded
//! relative to the centre of their bounding box; immovable vertices come
//! back with their exact host positions. Infinite potentials travel as
//! [`BIG`].

use bytemuck::{Pod, Zeroable};
use nalgebra::Point2;
use wgpu::util::DeviceExt;

use super::ComputeDevice;
use crate::algo::eikmesh::RelaxProblem;
use crate::algo::eikonal::{CellGrid, FimPass, UpdateOrder};
use crate::error::DeviceError;

const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_PER_DIM: u32 = 65_535;

/// Device-side stand-in for an infinite potential.
const BIG: f32 = 1e30;

const RELAX_SHADER: &str = r#"
struct Params {
    count: u32,
    delta_t: f32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> src: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read_write> dst: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> offsets: array<u32>;
@group(0) @binding(4) var<storage, read> neighbors: array<u32>;
@group(0) @binding(5) var<storage, read> desired: array<f32>;
@group(0) @binding(6) var<storage, read> max_travel: array<f32>;

@compute @workgroup_size(64)
fn relax(
    @builtin(global_invocation_id) id: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let i = id.x + id.y * groups.x * 64u;
    if (i >= params.count) {
        return;
    }
    let p = src[i];
    let cap = max_travel[i];
    if (cap <= 0.0) {
        dst[i] = p;
        return;
    }

    var force = vec2<f32>(0.0, 0.0);
    for (var k = offsets[i]; k < offsets[i + 1u]; k = k + 1u) {
        let d = p - src[neighbors[k]];
        let len = length(d);
        if (len > 1e-12) {
            force = force + d * (max(desired[k] - len, 0.0) / len);
        }
    }

    var step = force * params.delta_t;
    let len = length(step);
    if (len > cap) {
        step = step * (cap / len);
    }
    dst[i] = p + step;
}
"#;

const FIM_SHADER: &str = r#"
struct Params {
    nx: u32,
    ny: u32,
    count: u32,
    order: u32,
}

const BIG: f32 = 1e30;

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> values: array<f32>;
@group(0) @binding(2) var<storage, read> cost: array<f32>;
@group(0) @binding(3) var<storage, read> active: array<u32>;
@group(0) @binding(4) var<storage, read_write> result: array<f32>;

fn at(i: i32, j: i32) -> f32 {
    if (i < 0 || j < 0 || i >= i32(params.nx) || j >= i32(params.ny)) {
        return BIG;
    }
    return values[u32(j) * params.nx + u32(i)];
}

// (alpha, value) of the upwind term along (di, dj)
fn axis(i: i32, j: i32, di: i32, dj: i32) -> vec2<f32> {
    let back = at(i - di, j - dj);
    let fwd = at(i + di, j + dj);
    var t1 = back;
    var s = -1;
    if (fwd < back) {
        t1 = fwd;
        s = 1;
    }
    if (params.order == 2u && t1 < BIG) {
        let t2 = at(i + 2 * s * di, j + 2 * s * dj);
        if (t2 < BIG && t2 <= t1) {
            return vec2<f32>(2.25, (4.0 * t1 - t2) / 3.0);
        }
    }
    return vec2<f32>(1.0, t1);
}

fn solve2(a: vec2<f32>, b: vec2<f32>, fh: f32) -> f32 {
    var lo = a;
    var hi = b;
    if (b.y < a.y) {
        lo = b;
        hi = a;
    }
    if (lo.y >= BIG) {
        return BIG;
    }
    if (hi.y < BIG) {
        // Shifted so that lo.y is zero
        let d = hi.y - lo.y;
        let sa = lo.x + hi.x;
        let sv = hi.x * d;
        let svv = hi.x * d * d;
        let disc = sv * sv - sa * (svv - fh * fh);
        if (disc >= 0.0) {
            let t = (sv + sqrt(disc)) / sa;
            if (t >= d) {
                return lo.y + t;
            }
        }
    }
    return lo.y + fh / sqrt(lo.x);
}

@compute @workgroup_size(64)
fn fim(
    @builtin(global_invocation_id) id: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let k = id.x + id.y * groups.x * 64u;
    if (k >= params.count) {
        return;
    }
    let idx = active[k];
    let i = i32(idx % params.nx);
    let j = i32(idx / params.nx);
    let fh = cost[idx];
    var t = BIG;
    if (fh < BIG) {
        t = solve2(axis(i, j, 1, 0), axis(i, j, 0, 1), fh);
    }
    result[k] = min(t, values[idx]);
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RelaxParams {
    count: u32,
    delta_t: f32,
    _padding: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FimParams {
    nx: u32,
    ny: u32,
    count: u32,
    order: u32,
}

/// Uploaded relaxation state with ping-pong position buffers.
struct RelaxBuffers {
    count: usize,
    positions: [wgpu::Buffer; 2],
    bind_groups: [wgpu::BindGroup; 2],
    staging: wgpu::Buffer,
    current: usize,
    origin: Point2<f64>,
    host: Vec<Point2<f64>>,
    movable: Vec<bool>,
}

/// A wgpu compute device.
pub struct WgpuDevice {
    adapter: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    relax_pipeline: wgpu::ComputePipeline,
    fim_pipeline: wgpu::ComputePipeline,
    relax: Option<RelaxBuffers>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter", &self.adapter)
            .field("uploaded", &self.relax.as_ref().map(|r| r.count))
            .finish_non_exhaustive()
    }
}

impl WgpuDevice {
    /// Request an adapter and device and build both kernels.
    pub fn new() -> Result<Self, DeviceError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(DeviceError::NoAdapter)?;
        let info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("eikmesh compute"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| DeviceError::RequestFailed(e.to_string()))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let relax_pipeline = compute_pipeline(&device, "Relax", RELAX_SHADER, "relax");
        let fim_pipeline = compute_pipeline(&device, "FIM", FIM_SHADER, "fim");
        if let Some(err) = device.pop_error_scope().await {
            return Err(DeviceError::Kernel(err.to_string()));
        }

        tracing::debug!(adapter = %info.name, backend = ?info.backend, "wgpu device ready");
        Ok(Self {
            adapter: info.name,
            device,
            queue,
            relax_pipeline,
            fim_pipeline,
            relax: None,
        })
    }

    /// Name of the adapter in use.
    pub fn adapter_name(&self) -> &str {
        &self.adapter
    }

    fn storage<T: Pod>(&self, label: &str, data: &[T], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        // Zero-sized bindings are invalid
        let zero = [T::zeroed()];
        let contents: &[u8] = if data.is_empty() {
            bytemuck::cast_slice(&zero)
        } else {
            bytemuck::cast_slice(data)
        };
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::STORAGE | usage,
        })
    }

    fn staging(&self, label: &str, bytes: usize) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes.max(4) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn dispatch(&self, label: &str, pipeline: &wgpu::ComputePipeline, bind_groups: &[&wgpu::BindGroup], count: usize) {
        let (x, y) = workgroups(count);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        for bind_group in bind_groups {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, *bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn read_back<T: Pod>(&self, source: &wgpu::Buffer, staging: &wgpu::Buffer, len: usize) -> Result<Vec<T>, DeviceError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let size = (len * std::mem::size_of::<T>()) as wgpu::BufferAddress;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| DeviceError::Readback(e.to_string()))?
            .map_err(|e| DeviceError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range();
        let out = bytemuck::cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }
}

impl ComputeDevice for WgpuDevice {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn upload_relax(&mut self, problem: &RelaxProblem) -> Result<(), DeviceError> {
        let count = problem.len();
        let origin = bounding_centre(&problem.positions);
        let positions: Vec<[f32; 2]> = problem
            .positions
            .iter()
            .map(|p| [(p.x - origin.x) as f32, (p.y - origin.y) as f32])
            .collect();
        let max_travel: Vec<f32> = problem
            .max_travel
            .iter()
            .zip(&problem.movable)
            .map(|(&t, &m)| if m { t as f32 } else { 0.0 })
            .collect();
        let desired: Vec<f32> = problem.desired.iter().map(|&d| d as f32).collect();
        let params = RelaxParams {
            count: count as u32,
            delta_t: problem.delta_t as f32,
            _padding: [0; 2],
        };

        let usage = wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        let buffers = [
            self.storage("Relax Positions A", &positions, usage),
            self.storage("Relax Positions B", &positions, usage),
        ];
        let offsets = self.storage("Relax Offsets", &problem.offsets, wgpu::BufferUsages::empty());
        let neighbors = self.storage("Relax Neighbors", &problem.neighbors, wgpu::BufferUsages::empty());
        let desired = self.storage("Relax Desired", &desired, wgpu::BufferUsages::empty());
        let max_travel = self.storage("Relax Max Travel", &max_travel, wgpu::BufferUsages::empty());
        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Relax Params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let layout = self.relax_pipeline.get_bind_group_layout(0);
        let bind_group = |src: &wgpu::Buffer, dst: &wgpu::Buffer| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Relax Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: dst.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: offsets.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: neighbors.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: desired.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: max_travel.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [bind_group(&buffers[0], &buffers[1]), bind_group(&buffers[1], &buffers[0])];

        self.relax = Some(RelaxBuffers {
            count,
            staging: self.staging("Relax Staging", count * std::mem::size_of::<[f32; 2]>()),
            positions: buffers,
            bind_groups,
            current: 0,
            origin,
            host: problem.positions.clone(),
            movable: problem.movable.clone(),
        });
        Ok(())
    }

    fn relax_steps(&mut self, steps: usize) -> Result<(), DeviceError> {
        let relax = self.relax.as_ref().ok_or(DeviceError::NotUploaded)?;
        if relax.count == 0 || steps == 0 {
            return Ok(());
        }
        let groups: Vec<&wgpu::BindGroup> = (0..steps)
            .map(|s| &relax.bind_groups[(relax.current + s) % 2])
            .collect();
        self.dispatch("Relax Pass", &self.relax_pipeline, &groups, relax.count);
        let current = (relax.current + steps) % 2;
        if let Some(relax) = self.relax.as_mut() {
            relax.current = current;
        }
        Ok(())
    }

    fn download_positions(&mut self) -> Result<Vec<Point2<f64>>, DeviceError> {
        let relax = self.relax.as_ref().ok_or(DeviceError::NotUploaded)?;
        let raw: Vec<[f32; 2]> = self.read_back(&relax.positions[relax.current], &relax.staging, relax.count)?;
        Ok(raw
            .iter()
            .zip(relax.host.iter().zip(&relax.movable))
            .map(|(q, (&host, &movable))| {
                if movable {
                    Point2::new(relax.origin.x + f64::from(q[0]), relax.origin.y + f64::from(q[1]))
                } else {
                    host
                }
            })
            .collect())
    }

    fn fim_pass(
        &mut self,
        grid: &CellGrid,
        active: &[usize],
        order: UpdateOrder,
        tolerance: f64,
    ) -> Result<FimPass, DeviceError> {
        if active.is_empty() {
            return Ok(FimPass::default());
        }
        let h = grid.spacing();
        let values: Vec<f32> = grid.potentials().iter().map(|&v| to_device(v)).collect();
        let cost: Vec<f32> = (0..grid.len())
            .map(|i| {
                let speed = grid.speed(i);
                if speed > 0.0 { to_device(h / speed) } else { BIG }
            })
            .collect();
        let nodes: Vec<u32> = active.iter().map(|&i| i as u32).collect();
        let params = FimParams {
            nx: grid.nx() as u32,
            ny: grid.ny() as u32,
            count: nodes.len() as u32,
            order: match order {
                UpdateOrder::First => 1,
                UpdateOrder::Second => 2,
            },
        };

        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FIM Params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let values = self.storage("FIM Values", &values, wgpu::BufferUsages::empty());
        let cost = self.storage("FIM Cost", &cost, wgpu::BufferUsages::empty());
        let active_buffer = self.storage("FIM Active", &nodes, wgpu::BufferUsages::empty());
        let result = self.storage(
            "FIM Result",
            &vec![BIG; nodes.len()],
            wgpu::BufferUsages::COPY_SRC,
        );
        let staging = self.staging("FIM Staging", nodes.len() * std::mem::size_of::<f32>());

        let layout = self.fim_pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FIM Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: values.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: cost.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: active_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: result.as_entire_binding(),
                },
            ],
        });
        self.dispatch("FIM Pass", &self.fim_pipeline, &[&bind_group], nodes.len());
        let raw: Vec<f32> = self.read_back(&result, &staging, nodes.len())?;

        let mut pass = FimPass::default();
        for (&idx, &r) in active.iter().zip(&raw) {
            let current = grid.value(idx);
            let candidate = from_device(r).min(current);
            if candidate < current {
                pass.changed.push((idx, candidate));
            }
            // Single precision cannot resolve changes below its epsilon
            let slack = if current.is_finite() {
                tolerance.max(f64::from(f32::EPSILON) * current.abs())
            } else {
                tolerance
            };
            if !(current - candidate > slack) {
                pass.settled.push(idx);
            }
        }
        Ok(pass)
    }
}

fn compute_pipeline(device: &wgpu::Device, label: &str, source: &str, entry_point: &str) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &module,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

/// Workgroup counts covering `count` invocations, spilling into y past the
/// per-dimension limit.
fn workgroups(count: usize) -> (u32, u32) {
    let groups = (count as u32).div_ceil(WORKGROUP_SIZE).max(1);
    if groups <= MAX_GROUPS_PER_DIM {
        (groups, 1)
    } else {
        (MAX_GROUPS_PER_DIM, groups.div_ceil(MAX_GROUPS_PER_DIM))
    }
}

fn bounding_centre(points: &[Point2<f64>]) -> Point2<f64> {
    let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points.iter().filter(|p| p.x.is_finite() && p.y.is_finite()) {
        min = min.inf(p);
        max = max.sup(p);
    }
    if min.x > max.x {
        return Point2::origin();
    }
    nalgebra::center(&min, &max)
}

fn to_device(v: f64) -> f32 {
    if v.is_finite() && v < f64::from(BIG) {
        v as f32
    } else {
        BIG
    }
}

fn from_device(v: f32) -> f64 {
    if v >= BIG {
        f64::INFINITY
    } else {
        f64::from(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikmesh::{relax_cpu, EikMesh, EikMeshOptions};
    use crate::algo::eikonal::{EikonalSolver, GridMethod, GridSolver, GridSolverOptions};
    use crate::geometry::{distance, Domain, Rect, Shape};
    use crate::gpu::DeviceFimSolver;

    // These tests pass trivially on machines without an adapter.
    fn device() -> Option<WgpuDevice> {
        WgpuDevice::new().ok()
    }

    #[test]
    fn test_workgroups_split_large_dispatches() {
        assert_eq!(workgroups(0), (1, 1));
        assert_eq!(workgroups(64), (1, 1));
        assert_eq!(workgroups(65), (2, 1));
        let (x, y) = workgroups(64 * 70_000);
        assert_eq!(x, MAX_GROUPS_PER_DIM);
        assert_eq!(y, 2);
    }

    #[test]
    fn test_infinity_round_trips_through_big() {
        assert_eq!(to_device(f64::INFINITY), BIG);
        assert_eq!(from_device(BIG), f64::INFINITY);
        assert_eq!(from_device(to_device(2.5)), 2.5);
    }

    #[test]
    fn test_relax_matches_cpu() {
        let Some(mut gpu) = device() else {
            return;
        };
        let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
        let mut eik = EikMesh::new(
            bounds,
            distance::rect(bounds),
            distance::uniform(1.0),
            EikMeshOptions::with_h0(0.2),
        )
        .unwrap();
        eik.initialize().unwrap();
        let problem = eik.relax_problem();

        gpu.upload_relax(&problem).unwrap();
        gpu.relax_steps(1).unwrap();
        let device_positions = gpu.download_positions().unwrap();
        let host_positions = relax_cpu(&problem, false);
        for (a, b) in device_positions.iter().zip(&host_positions) {
            assert!((a - b).norm() < 1e-5, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_fim_matches_cpu() {
        let Some(gpu) = device() else {
            return;
        };
        let domain = Domain::new(Rect::new(0.0, 0.0, 4.0, 4.0))
            .with_obstacle(Rect::new(1.0, 1.5, 3.0, 2.0))
            .with_target(Shape::Point(Point2::new(2.0, 0.5)));
        let speed = |_: &Point2<f64>| 1.0;
        let options = GridSolverOptions::with_spacing(0.25).with_tolerance(1e-6);
        let mut reference = GridSolver::new(GridMethod::Fim, &domain, &speed, options.clone()).unwrap();
        reference.solve().unwrap();
        let mut solver = DeviceFimSolver::with_device(&domain, &speed, options, Box::new(gpu)).unwrap();
        solver.solve().unwrap();
        for (a, b) in reference.values().iter().zip(solver.values()) {
            if a.is_finite() {
                assert!((a - b).abs() < 1e-3 * a.max(1.0), "{a} vs {b}");
            } else {
                assert!(b.is_infinite());
            }
        }
    }
}
