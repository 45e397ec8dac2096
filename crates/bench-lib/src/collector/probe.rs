//! Cluster probe backed by the AWS CLI and Slurm
//!
//! EC2 capacity is read from `aws ec2 describe-instances` filtered on the
//! cluster tags. Joined nodes come from `sinfo` on the head node.

use super::ClusterProbe;
use crate::executor::{run_local_checked, RemoteExecutor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Node list with one `<name> <compact state>` line per node and partition
const SINFO_NODES_CMD: &str = "sinfo -N -h -o \"%N %t\"";

/// Slurm states of a node that has joined the cluster. `comp` covers nodes
/// still finishing a cancelled job. Any flag suffix (`~`, `#`, `%`, `*`,
/// ...) makes the state not match.
const JOINED_STATES: &[&str] = &["idle", "mix", "alloc", "comp"];

/// Probe for a ParallelCluster-managed Slurm cluster
pub struct ParallelClusterProbe {
    executor: Arc<dyn RemoteExecutor>,
}

impl ParallelClusterProbe {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ClusterProbe for ParallelClusterProbe {
    async fn ec2_capacity(&self, region: &str, cluster_name: &str) -> Result<u32> {
        let cluster_filter = format!("Name=tag:parallelcluster:cluster-name,Values={}", cluster_name);
        let output = run_local_checked(
            "aws",
            &[
                "ec2",
                "describe-instances",
                "--region",
                region,
                "--filters",
                &cluster_filter,
                "Name=tag:parallelcluster:node-type,Values=Compute",
                "Name=instance-state-name,Values=pending,running",
                "--query",
                "Reservations[].Instances[].InstanceId",
                "--output",
                "json",
            ],
        )
        .await?;

        let ids = parse_instance_ids(&output.stdout)?;
        trace!(cluster = cluster_name, instances = ids.len(), "EC2 capacity sampled");
        Ok(ids.len() as u32)
    }

    async fn joined_nodes(&self) -> Result<u32> {
        let output = self.executor.run_checked(SINFO_NODES_CMD).await?;
        Ok(parse_joined_nodes(&output.stdout))
    }
}

/// Parse the JSON id list printed by `describe-instances --query`
pub fn parse_instance_ids(stdout: &str) -> Result<Vec<String>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> =
        serde_json::from_str(trimmed).context("Failed to parse describe-instances output")?;
    // The same instance may be listed once per reservation page
    let unique: HashSet<String> = ids.into_iter().collect();
    let mut ids: Vec<String> = unique.into_iter().collect();
    ids.sort();
    Ok(ids)
}

/// Count distinct nodes in a joined state in `sinfo -N -h -o "%N %t"` output
pub fn parse_joined_nodes(stdout: &str) -> u32 {
    let mut joined = HashSet::new();
    for line in stdout.lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(state)) = (fields.next(), fields.next()) else {
            continue;
        };
        if JOINED_STATES.contains(&state) {
            joined.insert(name);
        }
    }
    joined.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;

    #[test]
    fn test_parse_instance_ids() {
        let ids = parse_instance_ids(r#"["i-0b", "i-0a", "i-0b"]"#).unwrap();
        assert_eq!(ids, vec!["i-0a".to_string(), "i-0b".to_string()]);

        assert!(parse_instance_ids("").unwrap().is_empty());
        assert!(parse_instance_ids("[]\n").unwrap().is_empty());
        assert!(parse_instance_ids("An error occurred").is_err());
    }

    #[test]
    fn test_parse_joined_nodes_counts_only_joined_states() {
        let sinfo = "\
queue-0-dy-c5-1 idle
queue-0-dy-c5-2 alloc
queue-0-dy-c5-3 mix
queue-0-dy-c5-4 idle~
queue-0-dy-c5-5 idle#
queue-0-dy-c5-6 down*
queue-0-dy-c5-7 drain
queue-0-dy-c5-8 alloc*
queue-0-dy-c5-9 comp
queue-0-dy-c5-10 comp~
";
        assert_eq!(parse_joined_nodes(sinfo), 4);
    }

    #[test]
    fn test_parse_joined_nodes_dedups_multi_partition_nodes() {
        let sinfo = "node-1 idle\nnode-1 idle\nnode-2 alloc\n\n";
        assert_eq!(parse_joined_nodes(sinfo), 2);
        assert_eq!(parse_joined_nodes(""), 0);
    }

    #[tokio::test]
    async fn test_joined_nodes_runs_sinfo_remotely() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("sinfo", 0, "n1 idle\nn2 alloc\nn3 idle~\n");

        let probe = ParallelClusterProbe::new(executor.clone());
        assert_eq!(probe.joined_nodes().await.unwrap(), 2);
        assert_eq!(executor.commands(), vec![SINFO_NODES_CMD.to_string()]);
    }
}
