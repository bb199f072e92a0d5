use cipcore::I;
use cipcore::numerics::tolerance_classes;
use cipcore::symmetry::components::Components;
use cipcore::symmetry::orbit::compute_orbits;
use cipcore::symmetry::orbitope::detect_orbitope;

fn main() {
    divan::main();
}

/// Column-swap generators of an `n x (n / 2)` variable grid.
fn grid_generators(n_cols: I) -> (I, Vec<Vec<I>>) {
    let n_rows = n_cols / 2;
    let n = n_rows * n_cols;
    let perms = (0..n_cols - 1)
        .map(|j| {
            let mut perm: Vec<I> = (0..n).collect();
            for i in 0..n_rows {
                perm.swap(i * n_cols + j, i * n_cols + j + 1);
            }
            perm
        })
        .collect();
    (n, perms)
}

#[divan::bench(args = [20, 60])]
fn components_build(bencher: divan::Bencher, n_cols: I) {
    let (n, perms) = grid_generators(n_cols);
    bencher.bench(|| Components::build(divan::black_box(&perms), divan::black_box(n)));
}

#[divan::bench(args = [20, 60])]
fn orbit_computation(bencher: divan::Bencher, n_cols: I) {
    let (n, perms) = grid_generators(n_cols);
    let refs: Vec<&[I]> = perms.iter().map(|p| p.as_slice()).collect();
    bencher.bench(|| compute_orbits(divan::black_box(n), divan::black_box(&refs), |_| true));
}

#[divan::bench(args = [10, 30])]
fn orbitope_detection(bencher: divan::Bencher, n_cols: I) {
    let (n, perms) = grid_generators(n_cols);
    let refs: Vec<&[I]> = perms.iter().map(|p| p.as_slice()).collect();
    bencher.bench(|| detect_orbitope(divan::black_box(&refs), divan::black_box(n), |_| true));
}

#[divan::bench(args = [1_000, 100_000])]
fn coefficient_classes(bencher: divan::Bencher, n: I) {
    // deterministic pseudo-random coefficients with heavy duplication
    let values: Vec<f64> = (0..n).map(|i| ((i * 2_654_435_761) % 97) as f64 / 7.).collect();
    bencher.bench(|| tolerance_classes(divan::black_box(&values)));
}
