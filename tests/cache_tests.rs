use flagwire::{
    EvaluationContext, FlagValue, ResolutionCache, ResolutionDetails, ResolutionReason,
};

fn static_details(flag_key: &str, value: bool) -> ResolutionDetails {
    ResolutionDetails::new(flag_key, FlagValue::Bool(value), ResolutionReason::Static)
}

#[test]
fn test_entries_are_keyed_by_context_fingerprint() {
    let cache = ResolutionCache::new(10);
    let fp_a = EvaluationContext::with_targeting_key("user-a").fingerprint();
    let fp_b = EvaluationContext::with_targeting_key("user-b").fingerprint();

    cache.put("flag", &fp_a, static_details("flag", true));

    assert!(cache.get("flag", &fp_a).is_some());
    assert!(cache.get("flag", &fp_b).is_none());
}

#[test]
fn test_invalidate_removes_flag_across_fingerprints() {
    let cache = ResolutionCache::new(10);
    cache.put("flag", "fp-1", static_details("flag", true));
    cache.put("flag", "fp-2", static_details("flag", true));
    cache.put("other", "fp-1", static_details("other", true));

    cache.invalidate(&["flag"]);

    assert!(cache.get("flag", "fp-1").is_none());
    assert!(cache.get("flag", "fp-2").is_none());
    assert!(cache.get("other", "fp-1").is_some());
}

#[test]
fn test_invalidate_with_multiple_keys() {
    let cache = ResolutionCache::new(10);
    cache.put("a", "fp", static_details("a", true));
    cache.put("b", "fp", static_details("b", true));
    cache.put("c", "fp", static_details("c", true));

    cache.invalidate(&["a", "c"]);

    assert!(cache.get("a", "fp").is_none());
    assert!(cache.get("b", "fp").is_some());
    assert!(cache.get("c", "fp").is_none());
}

#[test]
fn test_clear_empties_the_store() {
    let cache = ResolutionCache::new(10);
    cache.put("a", "fp", static_details("a", true));
    cache.put("b", "fp", static_details("b", true));

    cache.clear();

    assert!(cache.is_empty());
    assert!(cache.get("a", "fp").is_none());
}

#[test]
fn test_eviction_prefers_least_recently_used() {
    let cache = ResolutionCache::new(3);
    cache.put("a", "fp", static_details("a", true));
    cache.put("b", "fp", static_details("b", true));
    cache.put("c", "fp", static_details("c", true));

    // Refresh recency of a and b; c becomes the eviction candidate.
    cache.get("a", "fp");
    cache.get("b", "fp");

    cache.put("d", "fp", static_details("d", true));

    assert!(cache.get("c", "fp").is_none());
    assert!(cache.get("a", "fp").is_some());
    assert!(cache.get("b", "fp").is_some());
    assert!(cache.get("d", "fp").is_some());
}

#[test]
fn test_store_never_exceeds_capacity() {
    let cache = ResolutionCache::new(5);
    for i in 0..50 {
        let key = format!("flag-{}", i);
        cache.put(&key, "fp", static_details(&key, true));
        assert!(cache.len() <= 5);
    }
}

#[test]
fn test_overwrite_keeps_single_entry() {
    let cache = ResolutionCache::new(10);
    cache.put("flag", "fp", static_details("flag", true));
    cache.put("flag", "fp", static_details("flag", false));

    assert_eq!(cache.len(), 1);
    let hit = cache.get("flag", "fp").unwrap();
    assert_eq!(hit.value.as_bool(), Some(false));
}
