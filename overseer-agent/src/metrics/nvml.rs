//! NVML-backed telemetry source
//!
//! NVML reports processes by pid only, so owners are resolved through the
//! process table. The library is loaded on first use and a failed load is
//! retried on the next reading, which lets the agent start before the driver.

use super::{DeviceReading, ProcessUsage, TelemetrySource};
use crate::error::{OverseerError, Result};
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::Nvml;
use sysinfo::{Pid, System, Users};
use tracing::{debug, info};

const UNKNOWN_OWNER: &str = "unknown";

pub struct NvmlSource {
    nvml: Option<Nvml>,
    system: System,
    users: Users,
}

impl NvmlSource {
    pub fn new() -> Self {
        Self {
            nvml: None,
            system: System::new(),
            users: Users::new(),
        }
    }
}

impl Default for NvmlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for NvmlSource {
    fn read_devices(&mut self) -> Result<Vec<DeviceReading>> {
        if self.nvml.is_none() {
            let nvml = Nvml::init()
                .map_err(|e| OverseerError::telemetry(format!("NVML init failed: {}", e)))?;
            info!("NVML initialized");
            self.nvml = Some(nvml);
        }
        let Some(nvml) = self.nvml.as_ref() else {
            return Err(OverseerError::telemetry("NVML unavailable"));
        };

        // Process owners can change between ticks, refresh both tables each time.
        self.system.refresh_processes();
        self.users.refresh_list();

        let device_count = nvml
            .device_count()
            .map_err(|e| OverseerError::telemetry(format!("device count: {}", e)))?;

        let mut readings = Vec::with_capacity(device_count as usize);
        for index in 0..device_count {
            let device = nvml
                .device_by_index(index)
                .map_err(|e| OverseerError::telemetry(format!("GPU{}: {}", index, e)))?;
            let memory = device
                .memory_info()
                .map_err(|e| OverseerError::telemetry(format!("GPU{} memory: {}", index, e)))?;
            let processes = device
                .running_compute_processes()
                .map_err(|e| OverseerError::telemetry(format!("GPU{} processes: {}", index, e)))?;

            let processes = processes
                .into_iter()
                .map(|process| ProcessUsage {
                    username: owner_of(&self.system, &self.users, process.pid),
                    used_bytes: match process.used_gpu_memory {
                        UsedGpuMemory::Used(bytes) => bytes,
                        UsedGpuMemory::Unavailable => 0,
                    },
                })
                .collect::<Vec<_>>();

            debug!("GPU{}: {} compute process(es)", index, processes.len());
            readings.push(DeviceReading {
                total_bytes: memory.total,
                processes,
            });
        }

        Ok(readings)
    }
}

fn owner_of(system: &System, users: &Users, pid: u32) -> String {
    system
        .process(Pid::from_u32(pid))
        .and_then(|process| process.user_id())
        .and_then(|uid| users.get_user_by_id(uid))
        .map(|user| user.name().to_string())
        .unwrap_or_else(|| UNKNOWN_OWNER.to_string())
}
