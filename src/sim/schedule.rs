// per-step pass ordering, kept out of the dispatch backend so it is testable
use crate::sim::sort::{self, SortPass};

/// One dispatch of the simulation step. Every entry is followed by a full
/// device barrier; each pass consumes the complete output of its predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimPass {
    /// Gravity + cursor force into velocity, then predicted positions.
    ExternalForces,
    /// Reset the offset table to the empty sentinel.
    ClearOffsets,
    /// Cell keys from predicted positions, identity permutation.
    Partition,
    /// One compare-exchange pass of the bitonic network.
    Sort(SortPass),
    /// First sorted slot per occupied cell.
    BuildOffsets,
    /// SPH density at predicted positions.
    Density,
    /// Pressure + viscosity accelerations. Reads velocities, never writes
    /// them, so every invocation sees the same pre-step snapshot.
    Forces,
    /// Apply accelerations, integrate, boundary containment.
    Integrate,
}

/// The whole step in execution order. The sort expands into its (stage, step)
/// sub-passes for the padded particle count; a single-particle step has none.
pub fn step_schedule(num_particles: u32) -> Vec<SimPass> {
    let padded = sort::next_power_of_two(num_particles);
    let mut passes = vec![
        SimPass::ExternalForces,
        SimPass::ClearOffsets,
        SimPass::Partition,
    ];
    passes.extend(sort::pass_schedule(padded).into_iter().map(SimPass::Sort));
    passes.push(SimPass::BuildOffsets);
    passes.push(SimPass::Density);
    passes.push(SimPass::Forces);
    passes.push(SimPass::Integrate);
    passes
}

/// Checks the data-dependency invariants of a pass sequence for the given
/// particle count: predicted positions exist before partitioning, the table
/// is cleared before it is rebuilt, the sort sub-passes are exactly the
/// bitonic network for the padded count (in network order, between partition
/// and offsets), density precedes the force pass, forces precede integration,
/// and nothing runs twice.
pub fn is_well_ordered(passes: &[SimPass], num_particles: u32) -> bool {
    let position_of = |p: SimPass| passes.iter().position(|&q| q == p);
    let (
        Some(external),
        Some(clear),
        Some(partition),
        Some(offsets),
        Some(density),
        Some(forces),
        Some(last),
    ) = (
        position_of(SimPass::ExternalForces),
        position_of(SimPass::ClearOffsets),
        position_of(SimPass::Partition),
        position_of(SimPass::BuildOffsets),
        position_of(SimPass::Density),
        position_of(SimPass::Forces),
        position_of(SimPass::Integrate),
    )
    else {
        return false;
    };
    if !(external < partition && clear < offsets && partition < offsets) {
        return false;
    }
    if !(offsets < density && density < forces && forces < last && last == passes.len() - 1) {
        return false;
    }

    // the sort sub-passes must be the exact network for this size; a padded
    // size of 1 legitimately needs none
    let expected = sort::pass_schedule(sort::next_power_of_two(num_particles));
    let actual: Vec<SortPass> = passes
        .iter()
        .filter_map(|p| match p {
            SimPass::Sort(s) => Some(*s),
            _ => None,
        })
        .collect();
    if actual != expected {
        return false;
    }
    for (idx, pass) in passes.iter().enumerate() {
        match pass {
            SimPass::Sort(_) => {
                if idx < partition || idx > offsets {
                    return false;
                }
            }
            _ => {
                if passes[idx + 1..].contains(pass) {
                    return false;
                }
            }
        }
    }
    true
}
