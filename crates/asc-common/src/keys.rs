//! Store key layout.
//!
//! Bit-exact compatibility with existing deployments requires preserving
//! these patterns (spec section 6) — every crate that touches the store
//! goes through these helpers instead of formatting keys inline.

pub fn instance_status(group: &str, instance_id: &str) -> String {
    format!("instance:status:{group}:{instance_id}")
}

pub fn instance_status_scan_prefix(group: &str) -> String {
    format!("instance:status:{group}:*")
}

pub fn metric_available(group: &str, instance_id: &str, ts_ms: i64) -> String {
    format!("metric:available:{group}:{instance_id}:{ts_ms}")
}

pub fn metric_scan_prefix(group: &str) -> String {
    format!("metric:available:{group}:*")
}

pub fn group(name: &str) -> String {
    format!("group:{name}")
}

pub fn group_scan_prefix() -> &'static str {
    "group:*"
}

pub fn shutdown(instance_id: &str) -> String {
    format!("shutdown:{instance_id}")
}

pub fn scale_down_protection(group: &str, instance_id: &str) -> String {
    format!("scaleDownProtection:{group}:{instance_id}")
}

pub fn auto_scale_grace(group: &str) -> String {
    format!("autoScaleGrace:{group}")
}

pub fn group_jobs_grace() -> &'static str {
    "groupJobsGrace"
}

pub fn sanity_jobs_grace() -> &'static str {
    "sanityJobsGrace"
}

pub fn last_autoscaler_run(group: &str) -> String {
    format!("lastAutoScalerRun:{group}")
}

pub fn last_launcher_run(group: &str) -> String {
    format!("lastLauncherRun:{group}")
}

pub fn audit(group: &str) -> String {
    format!("audit:{group}")
}

pub fn group_lock(group: &str) -> String {
    format!("groupLock:{group}")
}

pub fn job_creation_lock() -> &'static str {
    "jobCreationLock"
}

/// Parse `<group>` back out of an `instance:status:<group>:<id>` key, as
/// produced by a cursor scan over [`instance_status_scan_prefix`].
pub fn parse_instance_status_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("instance:status:")?;
    rest.split_once(':')
}

/// Parse `<instance_id>` and `<timestamp>` back out of a
/// `metric:available:<group>:<id>:<ts>` key, as produced by a cursor scan
/// over [`metric_scan_prefix`].
pub fn parse_metric_key(key: &str) -> Option<(&str, i64)> {
    let rest = key.strip_prefix("metric:available:")?;
    let (_group, rest) = rest.split_once(':')?;
    let (instance_id, ts) = rest.rsplit_once(':')?;
    Some((instance_id, ts.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_instance_status_key() {
        let key = instance_status("jibri-eu", "i-123");
        assert_eq!(key, "instance:status:jibri-eu:i-123");
        assert_eq!(parse_instance_status_key(&key), Some(("jibri-eu", "i-123")));
    }

    #[test]
    fn metric_key_embeds_timestamp() {
        assert_eq!(
            metric_available("jibri-eu", "i-123", 42),
            "metric:available:jibri-eu:i-123:42"
        );
    }

    #[test]
    fn roundtrips_metric_key() {
        let key = metric_available("jibri-eu", "i-123", 42);
        assert_eq!(parse_metric_key(&key), Some(("i-123", 42)));
    }
}
