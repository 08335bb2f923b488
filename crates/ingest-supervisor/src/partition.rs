//! Consistent-hash worker partitioning (spec §5): all messages for the same
//! device key land on the same worker, so per-device ordering is preserved
//! without a global lock.

pub fn partition_for(device_key: &str, workers: usize) -> usize {
    if workers == 0 {
        return 0;
    }
    (seahash::hash(device_key.as_bytes()) % workers as u64) as usize
}
