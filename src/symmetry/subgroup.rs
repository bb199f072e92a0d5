//! Detection of orbitopal subgroups through cycle-free generator selection.
//!
//! Generators (restricted to products of disjoint 2-cycles) are visited by
//! increasing 2-cycle count. Each accepted generator adds its swaps as edges
//! to a graph over the variables, maintained as two disjoint-set structures:
//! variable -> graph component and graph component -> colour. A generator is
//! rejected when any of its edges would close a cycle, reuse a component
//! within the same generator, or merge two components of one colour (which
//! would collapse two rows of the same suborbitope).
//!
//! The accepted edges partition the moved variables into (component, colour)
//! pairs: components are the rows of a candidate suborbitope, colours group
//! the rows that belong together. A colour whose components all have equal
//! size of at least three yields an orbitope; every other colour contributes
//! weak symmetry-breaking pairs that force the colour-start representative
//! to be lexicographically leading within its component.

use crate::symmetry::components::DisjointSets;
use crate::symmetry::orbitope::two_cycles;
use crate::{I, VarId};

/// Result of the detection inside one symmetry-group component.
#[derive(Debug, Default)]
pub struct SubgroupDetection {
    /// Variable grids (rows x columns) of the detected suborbitopes, in
    /// permutation-variable indices.
    pub orbitopes: Vec<Vec<Vec<I>>>,
    /// `(representative, other)` pairs for weak SBCs `rep >= other`.
    pub weak_sbcs: Vec<(VarId, VarId)>,
    /// Generators whose edges were accepted into the graph.
    pub n_accepted: I,
}

pub fn detect_subgroups(perms: &[&[I]], n_vars: I) -> SubgroupDetection {
    // Generators usable as graph edges, by increasing 2-cycle count.
    let mut gens: Vec<Vec<(I, I)>> = perms.iter().filter_map(|p| two_cycles(p)).collect();
    gens.retain(|c| !c.is_empty());
    gens.sort_by_key(|c| c.len());

    let mut comps = DisjointSets::new(n_vars);
    let mut colors = DisjointSets::new(0);
    // valid at component roots only
    let mut color_of: Vec<Option<I>> = vec![None; n_vars];
    // ordered member list, held at the component root
    let mut members: Vec<Vec<I>> = (0..n_vars).map(|v| vec![v]).collect();

    let mut n_accepted = 0;
    for cycles in &gens {
        if !accept(&mut comps, &mut colors, &color_of, cycles) {
            continue;
        }

        // Merge the colours of all touched components, or open a fresh one.
        let mut merged_color: Option<I> = None;
        for &(x, y) in cycles {
            for v in [x, y] {
                if let Some(c) = color_of[comps.find(v)] {
                    let root = colors.find(c);
                    merged_color = Some(match merged_color {
                        Some(current) => colors.union(current, root).unwrap_or(current),
                        None => root,
                    });
                }
            }
        }
        let color = merged_color.unwrap_or_else(|| colors.push());

        for &(x, y) in cycles {
            let (rx, ry) = (comps.find(x), comps.find(y));
            let appended = std::mem::take(&mut members[ry]);
            let root = comps.union(rx, ry).expect("accepted edges join distinct components");
            let mut list = std::mem::take(&mut members[rx]);
            list.extend(appended);
            members[root] = list;
            color_of[root] = Some(color);
        }
        n_accepted += 1;
    }

    extract(n_vars, &mut comps, &mut colors, &color_of, &members, n_accepted)
}

/// The four rejection rules for one generator's tentative edges.
fn accept(
    comps: &mut DisjointSets,
    colors: &mut DisjointSets,
    color_of: &[Option<I>],
    cycles: &[(I, I)],
) -> bool {
    let mut touched: Vec<I> = Vec::with_capacity(2 * cycles.len());
    for &(x, y) in cycles {
        let (rx, ry) = (comps.find(x), comps.find(y));
        // an edge inside one component closes a cycle in the cumulative graph
        if rx == ry {
            return false;
        }
        // each component may carry at most one edge per generator
        if touched.contains(&rx) || touched.contains(&ry) {
            return false;
        }
        // merging two rows of one suborbitope would collapse them
        if let (Some(cx), Some(cy)) = (color_of[rx], color_of[ry])
            && colors.find(cx) == colors.find(cy)
        {
            return false;
        }
        touched.push(rx);
        touched.push(ry);
    }
    true
}

fn extract(
    n_vars: I,
    comps: &mut DisjointSets,
    colors: &mut DisjointSets,
    color_of: &[Option<I>],
    members: &[Vec<I>],
    n_accepted: I,
) -> SubgroupDetection {
    // Components in order of their smallest variable, grouped by colour in
    // order of first appearance.
    let mut color_groups: Vec<(I, Vec<&Vec<I>>)> = Vec::new();
    let mut seen_roots = vec![false; n_vars];
    for v in 0..n_vars {
        let root = comps.find(v);
        if seen_roots[root] || members[root].len() < 2 {
            continue;
        }
        seen_roots[root] = true;
        let Some(c) = color_of[root] else { continue };
        let color = colors.find(c);
        match color_groups.iter_mut().find(|(existing, _)| *existing == color) {
            Some((_, group)) => group.push(&members[root]),
            None => color_groups.push((color, vec![&members[root]])),
        }
    }

    let mut detection = SubgroupDetection { n_accepted, ..Default::default() };
    for (_, group) in color_groups {
        let size = group[0].len();
        if group.len() >= 2 && size >= 3 && group.iter().all(|list| list.len() == size) {
            detection
                .orbitopes
                .push(group.into_iter().cloned().collect());
        } else {
            // colour-start representative leads its component
            let rep_component = group[0];
            let rep = rep_component[0];
            for &other in &rep_component[1..] {
                detection.weak_sbcs.push((rep, other));
            }
        }
    }
    // weak SBCs only make sense for orbits enclosing a detected
    // suborbitope; a component without one stays with orbital fixing
    if detection.orbitopes.is_empty() {
        detection.weak_sbcs.clear();
    }
    detection
}
