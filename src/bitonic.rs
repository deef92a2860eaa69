use crate::config::PARALLEL_THRESHOLD;

pub type Run = Vec<f64>;

/// Merges two ascending runs into one ascending run of `left.len() + right.len()` elements.
pub fn merge(mut left: Run, mut right: Run) -> Run {
    right.reverse();
    bitonic_merge(&mut left, &mut right);
    bitonic_sort(&mut left);
    bitonic_sort(&mut right);
    left.append(&mut right);
    left
}

pub fn merge_parallel(mut left: Run, mut right: Run) -> Run {
    right.reverse();
    bitonic_merge(&mut left, &mut right);
    rayon::join(
        || bitonic_sort_parallel(&mut left),
        || bitonic_sort_parallel(&mut right),
    );
    left.append(&mut right);
    left
}

/// Cross half-cleaner: afterwards `left[i] <= right[i]` for every `i`.
pub fn bitonic_merge(left: &mut [f64], right: &mut [f64]) {
    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        if *l > *r {
            std::mem::swap(l, r);
        }
    }
}

/// Sorts a bitonic sequence of power-of-two length in ascending order.
pub fn bitonic_sort(list: &mut [f64]) {
    if list.len() > 1 {
        let half = list.len() / 2;
        let (low, high) = list.split_at_mut(half);
        bitonic_merge(low, high);
        bitonic_sort(low);
        bitonic_sort(high);
    }
}

pub fn bitonic_sort_parallel(list: &mut [f64]) {
    if list.len() <= PARALLEL_THRESHOLD {
        bitonic_sort(list);
        return;
    }
    let half = list.len() / 2;
    let (low, high) = list.split_at_mut(half);
    bitonic_merge(low, high);
    rayon::join(|| bitonic_sort_parallel(low), || bitonic_sort_parallel(high));
}

pub fn sort(list: &mut [f64]) {
    if list.len() > 1 {
        let half = list.len() / 2;
        let (low, high) = list.split_at_mut(half);
        sort(low);
        sort(high);
        high.reverse();
        bitonic_merge(low, high);
        bitonic_sort(low);
        bitonic_sort(high);
    }
}

pub fn is_sorted(list: &[f64]) -> bool {
    list.windows(2).all(|w| w[0] <= w[1])
}
