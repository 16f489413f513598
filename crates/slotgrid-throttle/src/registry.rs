//! ThrottleRegistry — named throttle policies per job and per label.
//!
//! Each policy sits behind its own mutex so that the admission check and
//! the execution record for one key happen atomically, while different
//! keys never contend. The outer maps are only write-locked to add or
//! remove policies.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use slotgrid_core::config::ThrottlePolicies;
use slotgrid_core::{SlotgridError, SlotgridResult};

use crate::policy::{ThrottleConfig, epoch_millis};

type PolicyHandle = Arc<Mutex<ThrottleConfig>>;

/// Namespace a throttle key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleScope {
    Job,
    Label,
}

impl fmt::Display for ThrottleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottleScope::Job => f.pad("job"),
            ThrottleScope::Label => f.pad("label"),
        }
    }
}

#[derive(Default)]
struct Namespaces {
    jobs: RwLock<HashMap<String, PolicyHandle>>,
    labels: RwLock<HashMap<String, PolicyHandle>>,
}

/// Shared registry of throttle policies.
///
/// Cheap to clone; clones share the same policies.
#[derive(Clone, Default)]
pub struct ThrottleRegistry {
    inner: Arc<Namespaces>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[throttle]` section of slotgrid.toml.
    pub fn from_config(policies: &ThrottlePolicies) -> SlotgridResult<Self> {
        let registry = Self::new();
        for p in &policies.job {
            registry.set_throttle(ThrottleScope::Job, &p.key, p.max_concurrent, p.period_seconds)?;
        }
        for p in &policies.label {
            registry.set_throttle(ThrottleScope::Label, &p.key, p.max_concurrent, p.period_seconds)?;
        }
        Ok(registry)
    }

    fn namespace(&self, scope: ThrottleScope) -> &RwLock<HashMap<String, PolicyHandle>> {
        match scope {
            ThrottleScope::Job => &self.inner.jobs,
            ThrottleScope::Label => &self.inner.labels,
        }
    }

    fn handle(&self, scope: ThrottleScope, key: &str) -> Option<PolicyHandle> {
        let map = self
            .namespace(scope)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    /// Define or replace the policy for `key`.
    ///
    /// Replacing a policy starts it with an empty execution history. An
    /// admission already holding the old policy records into it and that
    /// start is dropped; the new policy never sees it.
    pub fn set_throttle(
        &self,
        scope: ThrottleScope,
        key: &str,
        max_concurrent: u32,
        period_seconds: u64,
    ) -> SlotgridResult<()> {
        let policy = ThrottleConfig::new(max_concurrent, period_seconds)?;
        let mut map = self
            .namespace(scope)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.insert(key.to_string(), Arc::new(Mutex::new(policy)));
        debug!(%scope, %key, max_concurrent, period_seconds, "throttle set");
        Ok(())
    }

    /// Remove the policy for `key`. Returns false if none existed.
    pub fn remove_throttle(&self, scope: ThrottleScope, key: &str) -> bool {
        let mut map = self
            .namespace(scope)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let removed = map.remove(key).is_some();
        if removed {
            debug!(%scope, %key, "throttle removed");
        }
        removed
    }

    /// Snapshot of the policy for `key`, or `None` if unrestricted.
    pub fn get(&self, scope: ThrottleScope, key: &str) -> Option<ThrottleConfig> {
        self.handle(scope, key).map(|h| lock(&h).clone())
    }

    pub fn contains(&self, scope: ThrottleScope, key: &str) -> bool {
        self.handle(scope, key).is_some()
    }

    /// Defined keys in `scope`, sorted.
    pub fn keys(&self, scope: ThrottleScope) -> Vec<String> {
        let map = self
            .namespace(scope)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Record an execution start for `key` without checking admission.
    pub fn record_execution(&self, scope: ThrottleScope, key: &str) -> SlotgridResult<()> {
        self.record_execution_at(scope, key, epoch_millis())
    }

    pub fn record_execution_at(
        &self,
        scope: ThrottleScope,
        key: &str,
        now_ms: u64,
    ) -> SlotgridResult<()> {
        let handle = self
            .handle(scope, key)
            .ok_or_else(|| SlotgridError::UnknownKey(format!("{scope}/{key}")))?;
        lock(&handle).record_execution_at(now_ms);
        Ok(())
    }

    /// Check admission for one key and record the start if allowed.
    ///
    /// Keys with no policy are always admitted and nothing is recorded.
    /// A concurrent [`set_throttle`](Self::set_throttle) on the same key
    /// may drop the recorded start.
    pub fn try_admit(&self, scope: ThrottleScope, key: &str, current_running: u32) -> bool {
        self.try_admit_at(scope, key, current_running, epoch_millis())
    }

    pub fn try_admit_at(
        &self,
        scope: ThrottleScope,
        key: &str,
        current_running: u32,
        now_ms: u64,
    ) -> bool {
        let Some(handle) = self.handle(scope, key) else {
            return true;
        };
        let mut policy = lock(&handle);
        if !policy.is_allowed_to_start_at(current_running, now_ms) {
            debug!(%scope, %key, current_running, "admission denied");
            return false;
        }
        policy.record_execution_at(now_ms);
        true
    }

    /// Admit a build of `job`, optionally bound to `label`.
    ///
    /// Both the job policy and the label policy must allow the start; the
    /// execution is recorded against both only if they do. The job lock is
    /// always taken before the label lock.
    pub fn admit(
        &self,
        job: &str,
        label: Option<&str>,
        job_running: u32,
        label_running: u32,
    ) -> bool {
        self.admit_at(job, label, job_running, label_running, epoch_millis())
    }

    pub fn admit_at(
        &self,
        job: &str,
        label: Option<&str>,
        job_running: u32,
        label_running: u32,
        now_ms: u64,
    ) -> bool {
        let job_handle = self.handle(ThrottleScope::Job, job);
        let label_handle = label.and_then(|l| self.handle(ThrottleScope::Label, l));

        let mut job_policy = job_handle.as_ref().map(|h| lock(h));
        let mut label_policy = label_handle.as_ref().map(|h| lock(h));

        if let Some(p) = &job_policy {
            if !p.is_allowed_to_start_at(job_running, now_ms) {
                debug!(%job, job_running, "admission denied by job throttle");
                return false;
            }
        }
        if let Some(p) = &label_policy {
            if !p.is_allowed_to_start_at(label_running, now_ms) {
                debug!(%job, label = ?label, label_running, "admission denied by label throttle");
                return false;
            }
        }

        if let Some(p) = job_policy.as_mut() {
            p.record_execution_at(now_ms);
        }
        if let Some(p) = label_policy.as_mut() {
            p.record_execution_at(now_ms);
        }
        true
    }
}

impl fmt::Debug for ThrottleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleRegistry")
            .field("jobs", &self.keys(ThrottleScope::Job))
            .field("labels", &self.keys(ThrottleScope::Label))
            .finish()
    }
}

fn lock(handle: &Mutex<ThrottleConfig>) -> MutexGuard<'_, ThrottleConfig> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotgrid_core::config::ThrottlePolicy;
    use std::thread;

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn set_and_get() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "deploy", 2, 0).unwrap();

        let policy = reg.get(ThrottleScope::Job, "deploy").unwrap();
        assert_eq!(policy.max_concurrent(), 2);
        assert_eq!(policy.period_seconds(), 0);
        assert!(reg.get(ThrottleScope::Label, "deploy").is_none());
    }

    #[test]
    fn set_rejects_zero_max_concurrent() {
        let reg = ThrottleRegistry::new();
        let err = reg.set_throttle(ThrottleScope::Label, "gpu", 0, 60);
        assert!(matches!(err, Err(SlotgridError::InvalidArgument(_))));
        assert!(!reg.contains(ThrottleScope::Label, "gpu"));
    }

    #[test]
    fn set_overwrites_existing_policy() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "deploy", 2, 0).unwrap();
        reg.set_throttle(ThrottleScope::Job, "deploy", 5, 30).unwrap();

        let policy = reg.get(ThrottleScope::Job, "deploy").unwrap();
        assert_eq!(policy.max_concurrent(), 5);
        assert_eq!(policy.period_seconds(), 30);
        assert_eq!(reg.keys(ThrottleScope::Job), vec!["deploy"]);
    }

    #[test]
    fn replacing_a_policy_drops_recorded_starts() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "deploy", 1, 60).unwrap();
        assert!(reg.try_admit_at(ThrottleScope::Job, "deploy", 0, NOW));
        assert!(!reg.try_admit_at(ThrottleScope::Job, "deploy", 0, NOW + 1));

        reg.set_throttle(ThrottleScope::Job, "deploy", 1, 60).unwrap();
        let policy = reg.get(ThrottleScope::Job, "deploy").unwrap();
        assert!(policy.execution_times().is_empty());
        assert!(reg.try_admit_at(ThrottleScope::Job, "deploy", 0, NOW + 2));
    }

    #[test]
    fn remove_unknown_key_is_noop() {
        let reg = ThrottleRegistry::new();
        assert!(!reg.remove_throttle(ThrottleScope::Job, "missing"));

        reg.set_throttle(ThrottleScope::Job, "deploy", 1, 0).unwrap();
        assert!(reg.remove_throttle(ThrottleScope::Job, "deploy"));
        assert!(reg.get(ThrottleScope::Job, "deploy").is_none());
    }

    #[test]
    fn unknown_key_is_unrestricted() {
        let reg = ThrottleRegistry::new();
        assert!(reg.try_admit_at(ThrottleScope::Job, "anything", 1000, NOW));
    }

    #[test]
    fn record_on_unknown_key_fails() {
        let reg = ThrottleRegistry::new();
        assert!(matches!(
            reg.record_execution(ThrottleScope::Label, "gpu"),
            Err(SlotgridError::UnknownKey(_))
        ));
    }

    #[test]
    fn try_admit_records_start() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "nightly", 2, 60).unwrap();

        assert!(reg.try_admit_at(ThrottleScope::Job, "nightly", 0, NOW));
        assert!(reg.try_admit_at(ThrottleScope::Job, "nightly", 0, NOW + 1));
        // Window holds two starts now.
        assert!(!reg.try_admit_at(ThrottleScope::Job, "nightly", 0, NOW + 2));

        let policy = reg.get(ThrottleScope::Job, "nightly").unwrap();
        assert_eq!(policy.execution_times().len(), 2);
    }

    #[test]
    fn admit_requires_both_job_and_label() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "build", 5, 0).unwrap();
        reg.set_throttle(ThrottleScope::Label, "gpu", 1, 0).unwrap();

        assert!(reg.admit_at("build", Some("gpu"), 0, 0, NOW));
        // Label saturated.
        assert!(!reg.admit_at("build", Some("gpu"), 1, 1, NOW));
        // Job saturated.
        assert!(!reg.admit_at("build", Some("gpu"), 5, 0, NOW));
        // No label requirement: only the job policy applies.
        assert!(reg.admit_at("build", None, 1, 0, NOW));
    }

    #[test]
    fn denied_admission_records_nothing() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "build", 5, 60).unwrap();
        reg.set_throttle(ThrottleScope::Label, "gpu", 1, 60).unwrap();

        assert!(!reg.admit_at("build", Some("gpu"), 0, 1, NOW));
        let job = reg.get(ThrottleScope::Job, "build").unwrap();
        assert!(job.execution_times().is_empty());
    }

    #[test]
    fn from_config_loads_both_namespaces() {
        let policies = ThrottlePolicies {
            job: vec![ThrottlePolicy {
                key: "deploy".to_string(),
                max_concurrent: 1,
                period_seconds: 0,
            }],
            label: vec![ThrottlePolicy {
                key: "gpu".to_string(),
                max_concurrent: 4,
                period_seconds: 3600,
            }],
        };
        let reg = ThrottleRegistry::from_config(&policies).unwrap();
        assert!(reg.contains(ThrottleScope::Job, "deploy"));
        assert_eq!(
            reg.get(ThrottleScope::Label, "gpu").unwrap().period_seconds(),
            3600
        );
    }

    #[test]
    fn concurrent_admission_never_exceeds_cap() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "deploy", 3, 60).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                thread::spawn(move || reg.try_admit_at(ThrottleScope::Job, "deploy", 0, NOW))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let reg = ThrottleRegistry::new();
        reg.set_throttle(ThrottleScope::Job, "a", 1, 60).unwrap();
        reg.set_throttle(ThrottleScope::Job, "b", 1, 60).unwrap();

        assert!(reg.try_admit_at(ThrottleScope::Job, "a", 0, NOW));
        assert!(reg.try_admit_at(ThrottleScope::Job, "b", 0, NOW));
        assert!(!reg.try_admit_at(ThrottleScope::Job, "a", 0, NOW));
    }
}
