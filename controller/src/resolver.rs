//! Associates KubeletConfigs, MachineConfigPools and the node groups of a NUMAResourcesOperator.
use models::machineconfig::{KubeletConfig, MachineConfigPool};
use models::operator::{NUMAResourcesOperator, NodeGroup};
use models::selector;

use kube::ResourceExt;

/// Returns the first node group of the declaration whose selector matches the pool's labels, or `None` if there is
/// no declaration or no group matches.
pub fn resolve<'a>(
    declaration: Option<&'a NUMAResourcesOperator>,
    pool: &MachineConfigPool,
) -> Option<&'a NodeGroup> {
    declaration?.spec.node_groups.iter().find(|node_group| {
        selector::matches_optional(node_group.machine_config_pool_selector.as_ref(), pool.labels())
    })
}

/// Returns the pools whose labels satisfy the KubeletConfig's pool selector.
pub fn pools_for_kubelet_config<'a>(
    kubelet_config: &KubeletConfig,
    pools: &'a [MachineConfigPool],
) -> Vec<&'a MachineConfigPool> {
    pools
        .iter()
        .filter(|pool| {
            selector::matches_optional(
                kubelet_config.spec.machine_config_pool_selector.as_ref(),
                pool.labels(),
            )
        })
        .collect()
}
