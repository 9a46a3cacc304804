//! Cluster extraction from a reachability plot by relative steepness.
//!
//! A cluster is a valley in the plot bounded by a steep-down area on the left
//! and a steep-up area on the right, where "steep" means consecutive values
//! change by at least a factor of `1 - xi`.

#[derive(Debug, Clone, Copy)]
struct SteepDownArea {
    start: usize,
    end: usize,
    /// Maximum plot value seen between the end of this area and now.
    mib: f64,
}

/// Find clusters as inclusive `(start, end)` positions in the plot.
///
/// `plot` and `predecessor_plot` are in processing order; `ordering` maps plot
/// positions back to point indices. Clusters are reported in the order they
/// close, inner clusters of one steep-up area before outer ones.
pub(crate) fn xi_clusters(
    plot: &[f64],
    predecessor_plot: &[Option<usize>],
    ordering: &[usize],
    xi: f64,
    min_samples: usize,
    min_cluster_size: usize,
    predecessor_correction: bool,
) -> Vec<(usize, usize)> {
    let n = plot.len();
    if n == 0 {
        return Vec::new();
    }

    // Trailing infinity closes any valley still open at the end.
    let mut r = Vec::with_capacity(n + 1);
    r.extend_from_slice(plot);
    r.push(f64::INFINITY);

    let xc = 1.0 - xi;
    let ratio: Vec<f64> = (0..n).map(|i| r[i] / r[i + 1]).collect();
    let steep_up: Vec<bool> = ratio.iter().map(|&q| q <= xc).collect();
    let steep_down: Vec<bool> = ratio.iter().map(|&q| q >= 1.0 / xc).collect();
    let downward: Vec<bool> = ratio.iter().map(|&q| q > 1.0).collect();
    let upward: Vec<bool> = ratio.iter().map(|&q| q < 1.0).collect();

    let mut sdas: Vec<SteepDownArea> = Vec::new();
    let mut clusters = Vec::new();
    let mut index = 0;
    let mut mib = 0.0_f64;

    for steep_index in (0..n).filter(|&i| steep_up[i] || steep_down[i]) {
        if steep_index < index {
            continue;
        }
        mib = r[index..=steep_index].iter().fold(mib, |m, &v| m.max(v));

        if steep_down[steep_index] {
            update_filter_sdas(&mut sdas, mib, xc, &r);
            let start = steep_index;
            let end = extend_region(&steep_down, &upward, start, min_samples);
            sdas.push(SteepDownArea { start, end, mib: 0.0 });
            index = end + 1;
            mib = r[index];
            continue;
        }

        update_filter_sdas(&mut sdas, mib, xc, &r);
        let u_start = steep_index;
        let u_end = extend_region(&steep_up, &downward, u_start, min_samples);
        index = u_end + 1;
        mib = r[index];

        let mut closed = Vec::new();
        for d in &sdas {
            let mut c_start = d.start;
            let mut c_end = u_end;
            let after = r[c_end + 1];

            if after * xc < d.mib {
                continue;
            }

            let d_max = r[d.start];
            if d_max * xc >= after {
                while r[c_start + 1] > after && c_start < d.end {
                    c_start += 1;
                }
            } else if after * xc >= d_max {
                while c_end > u_start && r[c_end - 1] > d_max {
                    c_end -= 1;
                }
            }

            if predecessor_correction {
                match correct_predecessor(&r, predecessor_plot, ordering, c_start, c_end) {
                    Some((s, e)) => {
                        c_start = s;
                        c_end = e;
                    }
                    None => continue,
                }
            }

            if c_end < c_start || c_end - c_start + 1 < min_cluster_size {
                continue;
            }
            if c_start > d.end || c_end < u_start {
                continue;
            }
            closed.push((c_start, c_end));
        }

        closed.reverse();
        clusters.extend(closed);
    }

    clusters
}

/// Drop steep-down areas whose start is no longer high enough above `mib`,
/// and raise the remaining areas' `mib`.
fn update_filter_sdas(sdas: &mut Vec<SteepDownArea>, mib: f64, xc: f64, r: &[f64]) {
    if mib.is_infinite() {
        sdas.clear();
        return;
    }
    sdas.retain(|sda| mib <= r[sda.start] * xc);
    for sda in sdas.iter_mut() {
        sda.mib = sda.mib.max(mib);
    }
}

/// Grow a steep area from `start`.
///
/// The area ends at the last steep point before either a point moving the
/// other way or more than `min_samples` consecutive flat points.
fn extend_region(steep: &[bool], xward: &[bool], start: usize, min_samples: usize) -> usize {
    let mut non_xward = 0;
    let mut end = start;
    for index in start..steep.len() {
        if steep[index] {
            non_xward = 0;
            end = index;
        } else if !xward[index] {
            non_xward += 1;
            if non_xward > min_samples {
                break;
            }
        } else {
            return end;
        }
    }
    end
}

/// Shrink a cluster from the right until its last point was reached from
/// inside the cluster.
fn correct_predecessor(
    r: &[f64],
    predecessor_plot: &[Option<usize>],
    ordering: &[usize],
    s: usize,
    mut e: usize,
) -> Option<(usize, usize)> {
    while s < e {
        if r[s] > r[e] {
            return Some((s, e));
        }
        let p_e = predecessor_plot[e];
        if ordering[s..e].iter().any(|&o| p_e == Some(o)) {
            return Some((s, e));
        }
        e -= 1;
    }
    None
}

/// Turn plot-position clusters into per-point labels.
///
/// A cluster only gets a label if none of its points are labelled yet, so
/// enclosing clusters that were reported after their inner ones are skipped.
pub(crate) fn extract_xi_labels(ordering: &[usize], clusters: &[(usize, usize)]) -> Vec<i64> {
    let n = ordering.len();
    let mut plot_labels = vec![-1_i64; n];
    let mut label = 0;
    for &(s, e) in clusters {
        let span = &mut plot_labels[s..=e];
        if span.iter().all(|&l| l == -1) {
            span.fill(label);
            label += 1;
        }
    }

    let mut labels = vec![-1_i64; n];
    for (pos, &point) in ordering.iter().enumerate() {
        labels[point] = plot_labels[pos];
    }
    labels
}
