//! Process-wide snowflake id generator for incidents, attempts and seeded rows.

use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Configures the generator. Only the first call has an effect; ids handed
/// out before it use machine 1 / node 1.
pub fn init(machine_id: i32, node_id: i32) {
    let mut slot = GENERATOR.lock().unwrap_or_else(|p| p.into_inner());
    if slot.is_none() {
        *slot = Some(SnowflakeIdBucket::new(machine_id, node_id));
    }
}

pub fn next_id() -> String {
    let mut slot = GENERATOR.lock().unwrap_or_else(|p| p.into_inner());
    slot.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1))
        .get_id()
        .to_string()
}
