//! Batch v1 `Job` resource.
//!
//! Only the subset of the REST representation this tool populates or
//! reads back is modelled. Field names follow the API's camelCase JSON;
//! unset optionals are omitted from requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// CPU reserved for the single task, in thousandths of a vCPU.
pub const DEFAULT_CPU_MILLI: i64 = 1000;
/// Memory reserved for the single task.
pub const DEFAULT_MEMORY_MIB: i64 = 1024;
/// Wall-clock limit for the task.
pub const DEFAULT_MAX_RUN_DURATION_SECS: u64 = 600;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Server-assigned `projects/*/locations/*/jobs/*` name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Server-assigned unique id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_groups: Vec<TaskGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_policy: Option<AllocationPolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_policy: Option<LogsPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGroup {
    pub task_spec: TaskSpec,
    /// Int64 fields are accepted as JSON numbers or strings; the service
    /// echoes them back as strings.
    #[serde(default, with = "int64")]
    pub task_count: i64,
    #[serde(default, with = "int64")]
    pub parallelism: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub runnables: Vec<Runnable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_resource: Option<ComputeResource>,
    /// Duration string such as `"600s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_run_duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runnable {
    pub container: Container,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Extra `docker run` options, e.g. `--privileged`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResource {
    #[serde(default, with = "int64")]
    pub cpu_milli: i64,
    #[serde(default, with = "int64")]
    pub memory_mib: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    pub network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub network: String,
    pub subnetwork: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsPolicy {
    pub destination: LogsDestination,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogsDestination {
    #[default]
    DestinationUnspecified,
    CloudLogging,
    Path,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: Option<String>,
}

/// Int64 proto fields travel as JSON strings in responses.
mod int64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumberOrString {
            Number(i64),
            String(String),
        }

        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// `projects/{project}/locations/{region}`.
pub fn parent(project: &str, region: &str) -> String {
    format!("projects/{project}/locations/{region}")
}

/// Inputs for a one-task, one-container job.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub image_uri: String,
    pub entrypoint: String,
    pub commands: Vec<String>,
    pub container_options: Option<String>,
    pub region: String,
    pub network: String,
    pub subnet: String,
    pub cpu_milli: i64,
    pub memory_mib: i64,
    pub max_run_duration_secs: u64,
    pub labels: BTreeMap<String, String>,
}

impl JobTemplate {
    /// Template with default resources, running `entrypoint commands...`
    /// in `image_uri` on the `default` network of `region`.
    pub fn new(
        image_uri: impl Into<String>,
        entrypoint: impl Into<String>,
        commands: Vec<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            image_uri: image_uri.into(),
            entrypoint: entrypoint.into(),
            commands,
            container_options: None,
            region: region.into(),
            network: "default".to_string(),
            subnet: "default".to_string(),
            cpu_milli: DEFAULT_CPU_MILLI,
            memory_mib: DEFAULT_MEMORY_MIB,
            max_run_duration_secs: DEFAULT_MAX_RUN_DURATION_SECS,
            labels: BTreeMap::new(),
        }
    }

    /// `global/networks/{network}`.
    pub fn network_path(&self) -> String {
        format!("global/networks/{}", self.network)
    }

    /// `regions/{region}/subnetworks/{subnet}`.
    pub fn subnetwork_path(&self) -> String {
        format!("regions/{}/subnetworks/{}", self.region, self.subnet)
    }

    pub fn build(&self) -> Job {
        let runnable = Runnable {
            container: Container {
                image_uri: self.image_uri.clone(),
                entrypoint: Some(self.entrypoint.clone()),
                commands: self.commands.clone(),
                options: self.container_options.clone(),
            },
        };

        let task_spec = TaskSpec {
            runnables: vec![runnable],
            compute_resource: Some(ComputeResource {
                cpu_milli: self.cpu_milli,
                memory_mib: self.memory_mib,
            }),
            max_run_duration: Some(format!("{}s", self.max_run_duration_secs)),
        };

        // The job must run in the same VPC as the target to reach it.
        let network_interface = NetworkInterface {
            network: self.network_path(),
            subnetwork: self.subnetwork_path(),
        };

        Job {
            task_groups: vec![TaskGroup {
                task_spec,
                task_count: 1,
                parallelism: 1,
            }],
            allocation_policy: Some(AllocationPolicy {
                network: Some(NetworkPolicy {
                    network_interfaces: vec![network_interface],
                }),
            }),
            labels: self.labels.clone(),
            logs_policy: Some(LogsPolicy {
                destination: LogsDestination::CloudLogging,
            }),
            ..Job::default()
        }
    }
}
