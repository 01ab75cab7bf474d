//! Euclidean rhythm generation (Bjorklund's algorithm).

/// Distribute `hits` onsets as evenly as possible over `steps` slots, then
/// rotate the result left by `rotation` (negative values rotate right).
///
/// Degenerate inputs are total: `steps <= 0` yields an empty rhythm,
/// `hits <= 0` an all-rest one, and `hits >= steps` an all-hit one.
pub fn generate(hits: i32, steps: i32, rotation: i32) -> Vec<bool> {
    if steps <= 0 {
        return Vec::new();
    }
    let len = steps as usize;
    if hits <= 0 {
        return vec![false; len];
    }
    if hits >= steps {
        return vec![true; len];
    }
    let hits = hits as usize;

    // Fold the trailing rest groups onto the leading hit groups until at
    // most one remainder group is left.
    let mut front: Vec<Vec<bool>> = (0..hits).map(|_| vec![true]).collect();
    let mut back: Vec<Vec<bool>> = (0..len - hits).map(|_| vec![false]).collect();

    while back.len() > 1 {
        let paired = front.len().min(back.len());
        let mut folded = Vec::with_capacity(paired);
        for (head, tail) in front.iter().zip(back.iter()) {
            let mut group = head.clone();
            group.extend_from_slice(tail);
            folded.push(group);
        }
        let leftover = if front.len() > paired {
            front.split_off(paired)
        } else {
            back.split_off(paired)
        };
        front = folded;
        back = leftover;
    }

    let mut rhythm: Vec<bool> = front.into_iter().chain(back).flatten().collect();
    rhythm.rotate_left(normalize_rotation(rotation, steps));
    rhythm
}

/// `rotation mod steps`, always in `0..steps`.
fn normalize_rotation(rotation: i32, steps: i32) -> usize {
    (((rotation % steps) + steps) % steps) as usize
}
