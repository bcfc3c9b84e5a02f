use std::time::{Duration, SystemTime, UNIX_EPOCH};

use zk_protocol::Stat;

use super::identity;
use crate::native::RawStat;

/// Converts a raw stat into its host shape.
///
/// `session_id` is the identity of the session that received the stat and
/// decides `created_in_this_session`.
pub fn decode(raw: &RawStat, session_id: i64) -> Stat {
	Stat {
		czxid: raw.czxid,
		mzxid: raw.mzxid,
		pzxid: raw.pzxid,
		data_length: raw.data_length,
		num_children: raw.num_children,
		version: raw.version,
		cversion: raw.cversion,
		aversion: raw.aversion,
		ctime: millis_to_time(raw.ctime),
		mtime: millis_to_time(raw.mtime),
		ephemeral_owner: identity::encode_id(raw.ephemeral_owner),
		created_in_this_session: raw.ephemeral_owner == session_id,
	}
}

fn millis_to_time(millis: i64) -> SystemTime {
	if millis >= 0 {
		UNIX_EPOCH + Duration::from_millis(millis as u64)
	} else {
		UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn raw() -> RawStat {
		RawStat {
			czxid: 10,
			mzxid: 12,
			pzxid: 11,
			ctime: 1_700_000_000_123,
			mtime: 1_700_000_000_456,
			version: 2,
			cversion: 1,
			aversion: 0,
			ephemeral_owner: 0,
			data_length: 5,
			num_children: 1,
		}
	}

	#[test]
	fn copies_counters_and_timestamps() {
		let stat = decode(&raw(), 7);
		assert_eq!(stat.czxid, 10);
		assert_eq!(stat.mzxid, 12);
		assert_eq!(stat.pzxid, 11);
		assert_eq!(stat.version, 2);
		assert_eq!(stat.data_length, 5);
		assert_eq!(stat.num_children, 1);
		assert_eq!(stat.ctime.duration_since(UNIX_EPOCH).unwrap(), Duration::from_millis(1_700_000_000_123));
		assert_eq!(stat.mtime.duration_since(UNIX_EPOCH).unwrap(), Duration::from_millis(1_700_000_000_456));
		assert_eq!(stat.ephemeral_owner, "0");
		assert!(!stat.is_ephemeral());
	}

	#[test]
	fn created_in_this_session_compares_owner() {
		let mut raw = raw();
		raw.ephemeral_owner = 0x1_5a2b_0000_0001;
		assert!(decode(&raw, 0x1_5a2b_0000_0001).created_in_this_session);
		assert!(!decode(&raw, 0x1_5a2b_0000_0002).created_in_this_session);
		assert_eq!(decode(&raw, 0).ephemeral_owner, "15a2b00000001");
	}

	#[test]
	fn persistent_node_matches_unidentified_session() {
		// A session without an identity yet (id 0) sees persistent nodes as its own.
		assert!(decode(&raw(), 0).created_in_this_session);
	}

	#[test]
	fn negative_timestamps_precede_epoch() {
		let mut raw = raw();
		raw.ctime = -1_000;
		let stat = decode(&raw, 0);
		assert_eq!(UNIX_EPOCH.duration_since(stat.ctime).unwrap(), Duration::from_secs(1));
	}
}
