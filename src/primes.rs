//! Prime slot counts for the Robin Hood tables.
//!
//! Tables are addressed with `hash % slots`, so prime slot counts spread
//! poorly distributed hashes across the whole table. Each prime is roughly
//! double the previous one, which keeps growth amortized even though a full
//! table only asks for one more slot than it currently has.

const PRIMES: [u64; 59] = [
    53,
    97,
    191,
    383,
    769,
    1531,
    3067,
    6143,
    12289,
    24571,
    49157,
    98299,
    196613,
    393209,
    786431,
    1572869,
    3145721,
    6291449,
    12582917,
    25165813,
    50331653,
    100663291,
    201326611,
    402653189,
    805306357,
    1610612741,
    3221225473,
    6442450939,
    12884901893,
    25769803799,
    51539607551,
    103079215111,
    206158430209,
    412316860441,
    824633720831,
    1649267441651,
    3298534883309,
    6597069766657,
    13194139533299,
    26388279066623,
    52776558133303,
    105553116266489,
    211106232532969,
    422212465066001,
    844424930131963,
    1688849860263953,
    3377699720527861,
    6755399441055731,
    13510798882111483,
    27021597764222939,
    54043195528445957,
    108086391056891903,
    216172782113783773,
    432345564227567621,
    864691128455135207,
    1729382256910270481,
    3458764513820540933,
    6917529027641081903,
    13835058055282163729,
];

/// Returns the smallest tabled prime that is at least `required`.
///
/// Requests beyond the largest prime representable in `usize` are returned
/// unchanged. The table still works with a composite modulus, it just loses
/// the spreading benefit.
pub(crate) fn calculate_size(required: usize) -> usize {
    let required_wide = required as u64;
    let index = PRIMES.partition_point(|&p| p < required_wide);

    match PRIMES.get(index) {
        Some(&prime) if prime <= usize::MAX as u64 => prime as usize,
        _ => required,
    }
}

/// Slot count needed to hold `capacity` elements below `load_factor`.
///
/// Returns `None` if the division overflows `usize`.
pub(crate) fn slots_for(capacity: usize, load_factor: f64) -> Option<usize> {
    if capacity as f64 >= usize::MAX as f64 * load_factor {
        return None;
    }

    Some(calculate_size((capacity as f64 / load_factor) as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_next_prime() {
        assert_eq!(calculate_size(0), 53);
        assert_eq!(calculate_size(4), 53);
        assert_eq!(calculate_size(53), 53);
        assert_eq!(calculate_size(54), 97);
        assert_eq!(calculate_size(1000), 1531);
    }

    #[test]
    fn primes_are_ascending_and_roughly_doubling() {
        for pair in PRIMES.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[1] as u128 * 10 <= pair[0] as u128 * 21);
        }
    }

    #[test]
    fn beyond_the_table_returns_request() {
        if usize::BITS == 64 {
            assert_eq!(calculate_size(usize::MAX), usize::MAX);
        }
    }

    #[test]
    fn slots_for_divides_by_load() {
        assert_eq!(slots_for(4, 0.75), Some(53));
        assert_eq!(slots_for(100, 0.5), Some(383));
        assert_eq!(slots_for(usize::MAX, 0.5), None);
    }
}
