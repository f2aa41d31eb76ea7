//! Build-once cache of spin models keyed by (probe, correction level).
//!
//! The map itself sits behind a `Mutex` that is only held long enough to find
//! or create a slot. Each slot is a `OnceCell`, so concurrent first callers for
//! the same key block on one build while other keys build in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::info;
use once_cell::sync::OnceCell;

use crate::domain::{BuilderConfig, CorrectionLevel, ProbeId, SpinTelemetry, TimeRange};
use crate::error::Result;
use crate::models::spin_model::{build_spin_model, SpinModel};

type Slot = Arc<OnceCell<Arc<SpinModel>>>;

#[derive(Debug, Default)]
pub struct SpinModelCache {
    slots: Mutex<HashMap<(ProbeId, CorrectionLevel), Slot>>,
}

impl SpinModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached model for the key, building it with `build` on first use.
    ///
    /// A failed build leaves the slot empty; the next caller retries.
    pub fn get_or_build<F>(
        &self,
        probe: &ProbeId,
        level: CorrectionLevel,
        build: F,
    ) -> Result<Arc<SpinModel>>
    where
        F: FnOnce() -> Result<SpinModel>,
    {
        let slot = self.slot(probe, level);
        let model = slot.get_or_try_init(|| {
            let model = build()?;
            info!(
                "cached spin model for probe {probe} ({level}): {} segments",
                model.segments().len()
            );
            Ok::<_, crate::error::SpinModelError>(Arc::new(model))
        })?;
        Ok(Arc::clone(model))
    }

    /// `get_or_build` around `build_spin_model`.
    pub fn get_or_build_from(
        &self,
        probe: &ProbeId,
        level: CorrectionLevel,
        telemetry: &SpinTelemetry,
        range: Option<TimeRange>,
        config: &BuilderConfig,
    ) -> Result<Arc<SpinModel>> {
        self.get_or_build(probe, level, || {
            build_spin_model(probe, level, telemetry, range, config)
        })
    }

    pub fn get(&self, probe: &ProbeId, level: CorrectionLevel) -> Option<Arc<SpinModel>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&(probe.clone(), level))
            .and_then(|slot| slot.get().cloned())
    }

    /// Drop the cached model for the key, returning it if one was built.
    pub fn evict(&self, probe: &ProbeId, level: CorrectionLevel) -> Option<Arc<SpinModel>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .remove(&(probe.clone(), level))
            .and_then(|slot| slot.get().cloned())
    }

    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of built models.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, probe: &ProbeId, level: CorrectionLevel) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry((probe.clone(), level)).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::SpinModelError;

    fn telemetry() -> SpinTelemetry {
        SpinTelemetry {
            sun_pulse_times: (0..200).map(|i| 3.0 * i as f64).collect(),
            ..SpinTelemetry::default()
        }
    }

    #[test]
    fn second_lookup_returns_same_model() {
        let cache = SpinModelCache::new();
        let probe = ProbeId::new("c");
        let cfg = BuilderConfig::default();
        let t = telemetry();

        let a = cache
            .get_or_build_from(&probe, CorrectionLevel::NoCorrection, &t, None, &cfg)
            .unwrap();
        let b = cache
            .get_or_build_from(&probe, CorrectionLevel::NoCorrection, &t, None, &cfg)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
        assert_eq!(cache.len(), 1);

        // Levels are cached independently.
        let c = cache
            .get_or_build_from(&probe, CorrectionLevel::GapInterpolation, &t, None, &cfg)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let cache = SpinModelCache::new();
        let probe = ProbeId::new("d");
        let builds = AtomicUsize::new(0);
        let barrier = Barrier::new(8);
        let t = telemetry();

        let models: Vec<Arc<SpinModel>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_build(&probe, CorrectionLevel::NoCorrection, || {
                                builds.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                build_spin_model(
                                    &probe,
                                    CorrectionLevel::NoCorrection,
                                    &t,
                                    None,
                                    &BuilderConfig::default(),
                                )
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn failed_build_is_retried() {
        let cache = SpinModelCache::new();
        let probe = ProbeId::new("e");
        let level = CorrectionLevel::NoCorrection;

        let err = cache
            .get_or_build(&probe, level, || {
                Err(SpinModelError::InvalidTelemetry("boom".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, SpinModelError::InvalidTelemetry(_)));
        assert!(cache.get(&probe, level).is_none());
        assert!(cache.is_empty());

        let model = cache
            .get_or_build_from(&probe, level, &telemetry(), None, &BuilderConfig::default())
            .unwrap();
        assert!(Arc::ptr_eq(&model, &cache.get(&probe, level).unwrap()));
    }

    #[test]
    fn evict_and_clear_drop_models() {
        let cache = SpinModelCache::new();
        let probe = ProbeId::new("a");
        let cfg = BuilderConfig::default();
        let t = telemetry();
        for level in CorrectionLevel::ALL {
            cache.get_or_build_from(&probe, level, &t, None, &cfg).unwrap();
        }
        assert_eq!(cache.len(), 4);

        assert!(cache.evict(&probe, CorrectionLevel::NoCorrection).is_some());
        assert!(cache.evict(&probe, CorrectionLevel::NoCorrection).is_none());
        assert_eq!(cache.len(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }
}
