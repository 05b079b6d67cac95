//! 颜色直方图 + k-means 聚类
//!
//! Clustering is seeded so the same candidates always give the same
//! representatives.

use crate::core::video::frame::Frame;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-channel RGB histogram, `3 * bins` values, each channel summing to 1.
pub fn color_histogram(frame: &Frame, bins: usize) -> Vec<f64> {
    let bins = bins.clamp(1, 256);
    let mut hist = vec![0.0; 3 * bins];
    let pixels = frame.data.len() / 3;
    if pixels == 0 {
        return hist;
    }
    for rgb in frame.data.chunks_exact(3) {
        for (channel, &value) in rgb.iter().enumerate() {
            hist[channel * bins + value as usize * bins / 256] += 1.0;
        }
    }
    let total = pixels as f64;
    hist.iter_mut().for_each(|v| *v /= total);
    hist
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    pub max_iterations: usize,
    pub restarts: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

impl Clustering {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn members(&self, cluster: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter(move |(_, c)| **c == cluster)
            .map(|(i, _)| i)
    }
}

/// k-means++ with `restarts` independent runs; the lowest inertia wins.
/// `k` is capped at the number of points, and every cluster ends non-empty.
pub fn kmeans(features: &[Vec<f64>], k: usize, params: KMeansParams) -> Clustering {
    let n = features.len();
    let k = k.min(n);
    if k == 0 {
        return Clustering {
            assignments: Vec::new(),
            centroids: Vec::new(),
            inertia: 0.0,
        };
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<Clustering> = None;
    for run in 0..params.restarts.max(1) {
        let result = lloyd(features, init_plus_plus(features, k, &mut rng), params.max_iterations);
        debug!("k-means run {}: inertia {:.6}", run, result.inertia);
        if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
            best = Some(result);
        }
    }
    best.unwrap_or_else(|| lloyd(features, features[..k].to_vec(), params.max_iterations))
}

fn init_plus_plus(features: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = features.len();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut d2: Vec<f64> = features
        .iter()
        .map(|f| squared_distance(f, &features[chosen[0]]))
        .collect();

    while chosen.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = None;
            for (i, &d) in d2.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                if target < d {
                    pick = Some(i);
                    break;
                }
                target -= d;
            }
            // 浮点误差落到末尾时取最后一个正距离点
            pick.or_else(|| d2.iter().rposition(|&d| d > 0.0))
        } else {
            None
        };
        // 全部重合时按顺序补齐
        let next = next
            .or_else(|| (0..n).find(|i| !chosen.contains(i)))
            .unwrap_or(0);

        chosen.push(next);
        for (i, f) in features.iter().enumerate() {
            d2[i] = d2[i].min(squared_distance(f, &features[next]));
        }
    }
    chosen.into_iter().map(|i| features[i].clone()).collect()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

fn lloyd(features: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iterations: usize) -> Clustering {
    let k = centroids.len();
    let mut assignments: Vec<usize> = features.iter().map(|f| nearest(f, &centroids)).collect();
    fill_empty_clusters(features, &mut assignments, &mut centroids);

    for _ in 0..max_iterations {
        centroids = recompute_centroids(features, &assignments, k, &centroids);
        let mut next: Vec<usize> = features.iter().map(|f| nearest(f, &centroids)).collect();
        fill_empty_clusters(features, &mut next, &mut centroids);
        if next == assignments {
            break;
        }
        assignments = next;
    }

    let centroids = recompute_centroids(features, &assignments, k, &centroids);
    let inertia = features
        .iter()
        .zip(&assignments)
        .map(|(f, &c)| squared_distance(f, &centroids[c]))
        .sum();
    Clustering {
        assignments,
        centroids,
        inertia,
    }
}

fn recompute_centroids(
    features: &[Vec<f64>],
    assignments: &[usize],
    k: usize,
    previous: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    let dim = features.first().map_or(0, |f| f.len());
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (f, &c) in features.iter().zip(assignments) {
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(f) {
            *s += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(c, (sum, count))| {
            if count == 0 {
                previous[c].clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

/// Moves the point farthest from its centroid (taken from a cluster with at
/// least two members) into each empty cluster.
fn fill_empty_clusters(features: &[Vec<f64>], assignments: &mut [usize], centroids: &mut [Vec<f64>]) {
    let k = centroids.len();
    let mut counts = vec![0usize; k];
    for &c in assignments.iter() {
        counts[c] += 1;
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = features
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[assignments[*i]] > 1)
            .map(|(i, f)| (i, squared_distance(f, &centroids[assignments[i]])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        let Some((i, _)) = donor else { break };
        counts[assignments[i]] -= 1;
        counts[empty] += 1;
        assignments[i] = empty;
        centroids[empty] = features[i].clone();
    }
}

/// One index per cluster: the member closest to its centroid, ties going to
/// the earlier timestamp. Returned in cluster order.
pub fn representatives(features: &[Vec<f64>], clustering: &Clustering, timestamps: &[f64]) -> Vec<usize> {
    (0..clustering.k())
        .filter_map(|c| {
            clustering
                .members(c)
                .map(|i| (i, squared_distance(&features[i], &clustering.centroids[c])))
                .min_by(|(ia, da), (ib, db)| {
                    da.total_cmp(db)
                        .then_with(|| timestamps[*ia].total_cmp(&timestamps[*ib]))
                        .then_with(|| ia.cmp(ib))
                })
                .map(|(i, _)| i)
        })
        .collect()
}
