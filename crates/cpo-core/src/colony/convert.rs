//! Conversions between colony-native entities and the internal model.
//!
//! Wire values are validated at this boundary: unknown type tags, state
//! codes, or malformed fields reject the entity with `InvalidInput`
//! rather than leaking into the engine. Executor conversion round-trips:
//! id, type, location, and capability fields survive both directions.

use cpo_common::{
    Capabilities, Conditions, DataLocation, DataRequirements, Error, Executor, ExecutorId,
    ExecutorState, ExecutorType, GeoLocation, GpuSpec, HardwareSpec, Process, ProcessId,
    ProcessState, ResourceHints, Result, SoftwareSpec, Utilization, Zone,
};

use super::types::{
    executor_state, process_state, ColonyCapabilities, ColonyExecutor, ColonyGpu, ColonyHardware,
    ColonyLocation, ColonyProcess, ColonySoftware, ColonyUtilization,
};

fn executor_type_from_tag(tag: &str) -> Result<ExecutorType> {
    match tag {
        "edge" => Ok(ExecutorType::Edge),
        "cloud" => Ok(ExecutorType::Cloud),
        "hpc" => Ok(ExecutorType::Hpc),
        "fog" => Ok(ExecutorType::Fog),
        "local" => Ok(ExecutorType::Local),
        "private_cloud" => Ok(ExecutorType::PrivateCloud),
        "public_cloud" => Ok(ExecutorType::PublicCloud),
        other => Err(Error::InvalidInput(format!(
            "unknown executor type tag: {}",
            other
        ))),
    }
}

fn executor_state_from_code(code: i32) -> Result<ExecutorState> {
    match code {
        executor_state::PENDING => Ok(ExecutorState::Pending),
        executor_state::APPROVED => Ok(ExecutorState::Approved),
        executor_state::REJECTED => Ok(ExecutorState::Rejected),
        other => Err(Error::InvalidInput(format!(
            "unknown executor state code: {}",
            other
        ))),
    }
}

fn executor_state_to_code(state: ExecutorState) -> i32 {
    match state {
        ExecutorState::Pending => executor_state::PENDING,
        ExecutorState::Approved => executor_state::APPROVED,
        ExecutorState::Rejected => executor_state::REJECTED,
    }
}

fn process_state_from_code(code: i32) -> Result<ProcessState> {
    match code {
        process_state::WAITING => Ok(ProcessState::Waiting),
        process_state::RUNNING => Ok(ProcessState::Running),
        process_state::SUCCESSFUL => Ok(ProcessState::Successful),
        process_state::FAILED => Ok(ProcessState::Failed),
        other => Err(Error::InvalidInput(format!(
            "unknown process state code: {}",
            other
        ))),
    }
}

fn zone_from_tag(tag: &str) -> Result<Zone> {
    tag.parse::<Zone>().map_err(Error::InvalidInput)
}

impl TryFrom<ColonyExecutor> for Executor {
    type Error = Error;

    fn try_from(wire: ColonyExecutor) -> Result<Self> {
        let utilization = Utilization {
            compute: wire.utilization.cpu,
            memory: wire.utilization.memory,
            disk: wire.utilization.disk,
            network: wire.utilization.network,
        };
        if !utilization.is_valid() {
            return Err(Error::InvalidInput(format!(
                "executor {} reports utilization outside [0, 1]",
                wire.executor_id
            )));
        }
        if !(0.0..=1.0).contains(&wire.reliability) || wire.reliability.is_nan() {
            return Err(Error::InvalidInput(format!(
                "executor {} reliability {} outside [0, 1]",
                wire.executor_id, wire.reliability
            )));
        }

        Ok(Executor {
            id: ExecutorId(wire.executor_id),
            executor_type: executor_type_from_tag(&wire.executor_type)?,
            location: GeoLocation {
                longitude: wire.location.longitude,
                latitude: wire.location.latitude,
                description: wire.location.description,
            },
            region: wire.region,
            capabilities: Capabilities {
                hardware: HardwareSpec {
                    cpu_millicores: wire.capabilities.hardware.cpu_millicores,
                    memory_bytes: wire.capabilities.hardware.memory_bytes,
                    storage_bytes: wire.capabilities.hardware.storage_bytes,
                    gpus: wire
                        .capabilities
                        .hardware
                        .gpus
                        .into_iter()
                        .map(|g| GpuSpec {
                            name: g.name,
                            count: g.count,
                            memory_bytes: g.memory_bytes,
                        })
                        .collect(),
                },
                software: SoftwareSpec {
                    image: wire.capabilities.software.image,
                    kind: wire.capabilities.software.kind,
                    version: wire.capabilities.software.version,
                },
            },
            state: executor_state_from_code(wire.state)?,
            last_seen: wire.last_seen,
            utilization,
            reliability: wire.reliability,
            cost: cpo_common::CostCoefficients {
                compute_per_hour: wire.compute_cost_per_hour,
                energy_per_wh: wire.energy_cost_per_wh,
                network_per_gb: wire.network_cost_per_gb,
            },
            security_level: wire.security_level,
            jurisdiction: wire.jurisdiction,
            network_latency_ms: wire.network_latency_ms,
        })
    }
}

impl From<&Executor> for ColonyExecutor {
    fn from(executor: &Executor) -> Self {
        ColonyExecutor {
            executor_id: executor.id.0.clone(),
            executor_type: executor.executor_type.to_string(),
            location: ColonyLocation {
                longitude: executor.location.longitude,
                latitude: executor.location.latitude,
                description: executor.location.description.clone(),
            },
            region: executor.region.clone(),
            capabilities: ColonyCapabilities {
                hardware: ColonyHardware {
                    cpu_millicores: executor.capabilities.hardware.cpu_millicores,
                    memory_bytes: executor.capabilities.hardware.memory_bytes,
                    storage_bytes: executor.capabilities.hardware.storage_bytes,
                    gpus: executor
                        .capabilities
                        .hardware
                        .gpus
                        .iter()
                        .map(|g| ColonyGpu {
                            name: g.name.clone(),
                            count: g.count,
                            memory_bytes: g.memory_bytes,
                        })
                        .collect(),
                },
                software: ColonySoftware {
                    image: executor.capabilities.software.image.clone(),
                    kind: executor.capabilities.software.kind.clone(),
                    version: executor.capabilities.software.version.clone(),
                },
            },
            state: executor_state_to_code(executor.state),
            last_seen: executor.last_seen,
            utilization: ColonyUtilization {
                cpu: executor.utilization.compute,
                memory: executor.utilization.memory,
                disk: executor.utilization.disk,
                network: executor.utilization.network,
            },
            reliability: executor.reliability,
            compute_cost_per_hour: executor.cost.compute_per_hour,
            energy_cost_per_wh: executor.cost.energy_per_wh,
            network_cost_per_gb: executor.cost.network_per_gb,
            security_level: executor.security_level,
            jurisdiction: executor.jurisdiction.clone(),
            network_latency_ms: executor.network_latency_ms,
        }
    }
}

impl TryFrom<ColonyProcess> for Process {
    type Error = Error;

    fn try_from(wire: ColonyProcess) -> Result<Self> {
        if wire.spec.data.input_size_gb < 0.0 || wire.spec.data.input_size_gb.is_nan() {
            return Err(Error::InvalidInput(format!(
                "process {} declares negative input size",
                wire.process_id
            )));
        }

        let input_zone = zone_from_tag(&wire.spec.data.input_location)?;
        let output_location = match &wire.spec.data.output_location {
            Some(tag) => Some(DataLocation {
                zone: zone_from_tag(tag)?,
                region: wire.spec.data.output_region.clone(),
            }),
            None => None,
        };

        let executor_type = match &wire.spec.conditions.executor_type {
            Some(tag) => Some(executor_type_from_tag(tag)?),
            None => None,
        };

        let wait_deadline = wire
            .spec
            .max_wait_time_s
            .map(|secs| wire.submission_time + chrono::Duration::seconds(secs));
        let exec_deadline = wire
            .spec
            .max_exec_time_s
            .map(|secs| wire.submission_time + chrono::Duration::seconds(secs));

        Ok(Process {
            id: ProcessId(wire.process_id),
            func_name: wire.spec.func_name,
            args: wire.spec.args,
            kwargs: wire.spec.kwargs,
            conditions: Conditions {
                executor_type,
                min_cpu_millicores: wire.spec.conditions.min_cpu_millicores,
                min_memory_bytes: wire.spec.conditions.min_memory_bytes,
                requires_gpu: wire.spec.conditions.gpu_required,
                security_level: wire.spec.conditions.security_level,
                jurisdictions: wire.spec.conditions.jurisdictions,
            },
            priority: wire.spec.priority,
            wait_deadline,
            exec_deadline,
            data: DataRequirements {
                input_size_gb: wire.spec.data.input_size_gb,
                input_location: DataLocation {
                    zone: input_zone,
                    region: wire.spec.data.input_region,
                },
                output_location,
                sensitive: wire.spec.data.sensitive,
            },
            hints: ResourceHints {
                latency_sensitive: wire.spec.hints.latency_sensitive,
                cpu_intensive: wire.spec.hints.cpu_intensive,
                memory_intensive: wire.spec.hints.memory_intensive,
                gpu_intensive: wire.spec.hints.gpu_intensive,
                network_intensive: wire.spec.hints.network_intensive,
                cost_sensitive: wire.spec.hints.cost_sensitive,
            },
            safety_critical: wire.spec.safety_critical,
            locality_required: wire.spec.locality_required,
            submitted_at: wire.submission_time,
            started_at: wire.start_time,
            ended_at: wire.end_time,
            state: process_state_from_code(wire.state)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::types::{
        ColonyConditions, ColonyDataSpec, ColonyHints, ColonyProcessSpec,
    };
    use chrono::Utc;

    fn wire_executor(id: &str) -> ColonyExecutor {
        ColonyExecutor {
            executor_id: id.to_string(),
            executor_type: "private_cloud".into(),
            location: ColonyLocation {
                longitude: 18.06,
                latitude: 59.33,
                description: "stockholm-dc2".into(),
            },
            region: Some("eu-north".into()),
            capabilities: ColonyCapabilities {
                hardware: ColonyHardware {
                    cpu_millicores: 32_000,
                    memory_bytes: 64 << 30,
                    storage_bytes: 2 << 40,
                    gpus: vec![ColonyGpu {
                        name: "a100".into(),
                        count: 4,
                        memory_bytes: 40 << 30,
                    }],
                },
                software: ColonySoftware {
                    image: "colony/runtime:1.2".into(),
                    kind: "container".into(),
                    version: "1.2.0".into(),
                },
            },
            state: executor_state::APPROVED,
            last_seen: Utc::now(),
            utilization: ColonyUtilization {
                cpu: 0.4,
                memory: 0.3,
                disk: 0.1,
                network: 0.2,
            },
            reliability: 0.97,
            compute_cost_per_hour: 0.18,
            energy_cost_per_wh: 0.0003,
            network_cost_per_gb: 0.05,
            security_level: 4,
            jurisdiction: Some("eu".into()),
            network_latency_ms: 35.0,
        }
    }

    fn wire_process(id: &str) -> ColonyProcess {
        ColonyProcess {
            process_id: id.to_string(),
            spec: ColonyProcessSpec {
                func_name: "reduce_results".into(),
                args: vec![serde_json::json!(42)],
                kwargs: Default::default(),
                conditions: ColonyConditions {
                    executor_type: Some("hpc".into()),
                    min_cpu_millicores: 4000,
                    min_memory_bytes: 8 << 30,
                    gpu_required: false,
                    security_level: 2,
                    jurisdictions: vec![],
                },
                priority: 5,
                max_wait_time_s: Some(120),
                max_exec_time_s: Some(600),
                data: ColonyDataSpec {
                    input_size_gb: 12.0,
                    input_location: "hpc".into(),
                    input_region: Some("eu-north".into()),
                    output_location: Some("cloud".into()),
                    output_region: None,
                    sensitive: true,
                },
                hints: ColonyHints {
                    cpu_intensive: true,
                    ..Default::default()
                },
                safety_critical: false,
                locality_required: false,
            },
            state: process_state::WAITING,
            submission_time: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn executor_round_trip_preserves_identity_and_capabilities() {
        let wire = wire_executor("exec-7");
        let internal = Executor::try_from(wire.clone()).unwrap();
        let back = ColonyExecutor::from(&internal);
        assert_eq!(back.executor_id, wire.executor_id);
        assert_eq!(back.executor_type, wire.executor_type);
        assert_eq!(back.location, wire.location);
        assert_eq!(back.capabilities, wire.capabilities);
        assert_eq!(back, wire);
    }

    #[test]
    fn unknown_executor_type_is_rejected() {
        let mut wire = wire_executor("exec-8");
        wire.executor_type = "quantum".into();
        let err = Executor::try_from(wire).unwrap_err();
        assert_eq!(err.code(), 20);
    }

    #[test]
    fn unknown_state_code_is_rejected() {
        let mut wire = wire_executor("exec-9");
        wire.state = 7;
        assert!(Executor::try_from(wire).is_err());
    }

    #[test]
    fn out_of_range_utilization_is_rejected() {
        let mut wire = wire_executor("exec-10");
        wire.utilization.cpu = 1.4;
        assert!(Executor::try_from(wire).is_err());
    }

    #[test]
    fn process_conversion_derives_deadlines() {
        let wire = wire_process("proc-1");
        let submitted = wire.submission_time;
        let process = Process::try_from(wire).unwrap();
        assert_eq!(process.id.0, "proc-1");
        assert_eq!(process.state, ProcessState::Waiting);
        assert_eq!(
            process.wait_deadline.unwrap(),
            submitted + chrono::Duration::seconds(120)
        );
        assert_eq!(
            process.exec_deadline.unwrap(),
            submitted + chrono::Duration::seconds(600)
        );
        assert_eq!(process.data.input_location.zone, Zone::Hpc);
        assert_eq!(
            process.conditions.executor_type,
            Some(ExecutorType::Hpc)
        );
        assert!(process.data.sensitive);
    }

    #[test]
    fn bad_zone_tag_rejects_the_process() {
        let mut wire = wire_process("proc-2");
        wire.spec.data.input_location = "orbital".into();
        assert!(Process::try_from(wire).is_err());
    }

    #[test]
    fn negative_input_size_rejects_the_process() {
        let mut wire = wire_process("proc-3");
        wire.spec.data.input_size_gb = -1.0;
        assert!(Process::try_from(wire).is_err());
    }
}
