//! Picking the users for the next shift.

use crate::model::{DutyGroup, DutyUser};

/// Users on duty for the shift at `user_index`, plus the index of the shift
/// after it.
///
/// Specified groups hand out one configured user list per shift and cycle
/// back to the first. Auto groups take `group_number` consecutive users from
/// the pool; when the slice runs past the end it is padded from the start of
/// the pool and the returned index points just past the padding.
///
/// An index beyond the configured users (a rule edited since the cursor was
/// saved) restarts at 0. A pool smaller than one group puts everyone on duty.
#[must_use]
pub fn get_group_duty_users(group: &DutyGroup, user_index: usize) -> (Vec<DutyUser>, usize) {
    match group {
        DutyGroup::Specified { shifts } => {
            if shifts.is_empty() {
                return (Vec::new(), 0);
            }
            let index = if user_index < shifts.len() { user_index } else { 0 };
            let next = index + 1;
            let next = if next >= shifts.len() { 0 } else { next };
            (shifts[index].clone(), next)
        }
        DutyGroup::Auto { pool, group_number } => {
            let size = group_number.get();
            if pool.len() < size {
                return (pool.clone(), 0);
            }
            let index = if user_index < pool.len() { user_index } else { 0 };
            let next = index + size;
            if next < pool.len() {
                return (pool[index..next].to_vec(), next);
            }

            let mut users = pool[index..].to_vec();
            let pad = size - users.len();
            users.extend_from_slice(&pool[..pad]);
            (users, pad)
        }
    }
}
