//! End-to-end scenarios against the public service API
//!
//! Each test drives the whole pipeline over a real temp database:
//! analyzer -> duplicate detector -> repository -> search engine ->
//! learning engine.

use engram_core::{
    Category, PreferenceCategory, SearchMode, SearchOptions, StorageOutcome, ThresholdSource,
};
use engram_e2e::{fixtures, TestContext};

#[test]
fn auto_store_happy_path() {
    let ctx = TestContext::new();
    let (user, ai) = fixtures::STRONG_PREFERENCE;

    let outcome = ctx
        .service
        .process_exchange(user, ai, None, Some("claude"), false)
        .unwrap();

    let StorageOutcome::AutoStored { conversation_id, category, confidence, tags, .. } = outcome
    else {
        panic!("expected auto store, got {:?}", outcome);
    };
    assert_eq!(category, Category::Preference);
    assert!(confidence >= 0.85);
    assert!(tags.contains(&"auto_stored".to_string()));
    assert!(tags.contains(&"preference".to_string()));

    // Persisted with the intelligent-storage metadata
    let stored = ctx.service.store().get_conversation(&conversation_id).unwrap();
    assert_eq!(stored.metadata.auto_stored, Some(true));
    assert!(stored.metadata.confidence.unwrap() >= 0.85);
    assert_eq!(stored.metadata.analysis_category, Some(Category::Preference));

    // Retrievable as the top hit
    let hits = ctx
        .service
        .search_memory("indentation", &SearchOptions::default())
        .unwrap();
    assert_eq!(hits[0].conversation_id, conversation_id);
}

#[test]
fn exact_duplicate_skips_with_target_id() {
    let ctx = TestContext::new();
    let (user, ai) = fixtures::STRONG_PREFERENCE;

    let first = ctx
        .service
        .process_exchange(user, ai, None, Some("claude"), false)
        .unwrap();
    let StorageOutcome::AutoStored { conversation_id, .. } = first else {
        panic!("expected auto store");
    };

    let second = ctx
        .service
        .process_exchange(user, ai, None, Some("claude"), false)
        .unwrap();
    let StorageOutcome::SkippedDuplicate { target_id, .. } = second else {
        panic!("expected skipped duplicate, got {:?}", second);
    };
    assert_eq!(target_id, conversation_id);
    assert_eq!(ctx.service.store().count_conversations().unwrap(), 1);
}

#[test]
fn near_duplicate_merges_and_keeps_both_phrasings() {
    let ctx = TestContext::new();

    // Seed an existing preference directly through the store path
    let existing = ctx
        .service
        .store_context(
            "always use two space indentation python files repository convention spacing",
            "claude",
            {
                let mut meta = engram_core::ConversationMetadata::default();
                meta.analysis_category = Some(Category::Preference);
                Some(meta)
            },
            None,
            vec![],
        )
        .unwrap();

    let candidates = ctx
        .service
        .check_duplicates(
            "always use two space indentation python files repository convention spacing rule",
            Some("claude"),
            None,
        )
        .unwrap();
    assert_eq!(candidates[0].strength, engram_core::MatchStrength::Near);

    // Drive the same content through the optimizer via the detector decision
    let decision = engram_core::DuplicateDetector::new(engram_core::SharedConfig::new(
        ctx.service.config_snapshot(),
    ))
    .decide(
        "always use two space indentation python files repository convention spacing rule",
        Category::Preference,
        &candidates,
    );
    let engram_core::StorageDecision::Merge { target_id, merged_content, .. } = decision else {
        panic!("expected merge, got {:?}", decision);
    };
    assert_eq!(target_id, existing.id);
    assert!(merged_content.contains("rule"));
    assert!(merged_content.contains("convention spacing"));
}

#[test]
fn suggest_then_modify_approve_records_modification_feedback() {
    let ctx = TestContext::new();
    let (user, ai) = fixtures::WEAK_PREFERENCE;

    let outcome = ctx
        .service
        .process_exchange(user, ai, None, Some("claude"), false)
        .unwrap();
    let StorageOutcome::Suggest { suggestion_id, confidence, .. } = outcome else {
        panic!("expected suggestion, got {:?}", outcome);
    };
    assert!((0.60..0.85).contains(&confidence));

    let stored = ctx
        .service
        .approve_suggestion(
            &suggestion_id,
            Some("Prefer concise, imperative commit messages".to_string()),
            vec![],
        )
        .unwrap();
    assert_eq!(stored.content, "Prefer concise, imperative commit messages");
    assert!(stored.tags.contains(&"suggested".to_string()));
    assert!(stored.tags.contains(&"user_approved".to_string()));

    // MODIFICATION feedback landed in learning preferences
    let learning_rows = ctx
        .service
        .store()
        .list_preferences(Some(PreferenceCategory::Learning))
        .unwrap();
    assert!(learning_rows.iter().any(|p| p.key.starts_with("feedback:modification:")));
}

#[test]
fn mass_rejection_raises_the_auto_threshold() {
    let ctx = TestContext::new();
    let (user, ai) = fixtures::WEAK_PREFERENCE;

    let baseline = ctx.service.analyze(user, ai, None, Some("claude")).unwrap();
    let category = baseline.category;
    assert!(baseline.should_store);

    for _ in 0..25 {
        let outcome = ctx
            .service
            .process_exchange(user, ai, None, Some("claude"), false)
            .unwrap();
        if let StorageOutcome::Suggest { suggestion_id, .. } = outcome {
            ctx.service
                .reject_suggestion(&suggestion_id, Some("not useful".to_string()))
                .unwrap();
        }
    }

    let stats = ctx.service.learning().category_stats(category).unwrap();
    assert_eq!(stats.approval_rate(), 0.0);
    assert!(stats.rejections >= 20);

    // The learned threshold exceeds the default on the next analysis
    let thresholds = ctx.service.learning().thresholds_for(category);
    assert!(thresholds.auto_store > 0.85);
}

#[test]
fn hybrid_degrades_to_keyword_and_health_reflects_it() {
    let ctx = TestContext::new();
    if ctx.service.engine().semantic_available() {
        // Only meaningful without an embedder (the default build)
        return;
    }

    ctx.service
        .store_context(
            "indentation preferences for the python codebase",
            "claude",
            None,
            None,
            vec![],
        )
        .unwrap();

    let hybrid = ctx
        .service
        .search_memory(
            "indentation preferences",
            &SearchOptions { search_type: SearchMode::Hybrid, ..Default::default() },
        )
        .unwrap();
    assert!(!hybrid.is_empty(), "keyword-ranked results must still come back");

    let keyword = ctx
        .service
        .search_memory(
            "indentation preferences",
            &SearchOptions { search_type: SearchMode::Keyword, ..Default::default() },
        )
        .unwrap();
    let hybrid_ids: Vec<_> = hybrid.iter().map(|h| &h.conversation_id).collect();
    let keyword_ids: Vec<_> = keyword.iter().map(|h| &h.conversation_id).collect();
    assert_eq!(hybrid_ids, keyword_ids);

    let health = ctx.service.health();
    assert_eq!(health.overall_status, "degraded");
    assert!(health
        .components
        .iter()
        .any(|c| c.name == "semantic_search" && c.status == "degraded"));
}

#[test]
fn small_talk_is_dropped() {
    let ctx = TestContext::new();
    let (user, ai) = fixtures::SMALL_TALK;
    let outcome = ctx
        .service
        .process_exchange(user, ai, None, Some("claude"), false)
        .unwrap();
    assert!(matches!(outcome, StorageOutcome::None { .. }));
    assert_eq!(ctx.service.store().count_conversations().unwrap(), 0);
}

#[test]
fn solutions_survive_restart_and_stay_searchable() {
    let mut ctx = TestContext::new();
    let (user, ai) = fixtures::SOLUTION;
    let outcome = ctx
        .service
        .process_exchange(user, ai, None, Some("claude"), true)
        .unwrap();
    let id = match outcome {
        StorageOutcome::AutoStored { conversation_id, .. } => conversation_id,
        other => panic!("expected stored solution, got {:?}", other),
    };

    ctx = ctx.reopen();
    let hits = ctx
        .service
        .search_memory("lockfile", &SearchOptions::default())
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].conversation_id, id);
}

#[test]
fn edit_is_reflected_in_search_and_delete_is_terminal() {
    let ctx = TestContext::new();
    let conversation = ctx
        .service
        .store_context("the original wording of this memory", "claude", None, None, vec![])
        .unwrap();

    ctx.service
        .edit_memory(
            &conversation.id,
            Some("a completely new formulation".to_string()),
            None,
            None,
        )
        .unwrap();

    assert!(ctx
        .service
        .search_memory("original wording", &SearchOptions::default())
        .unwrap()
        .is_empty());
    assert_eq!(
        ctx.service
            .search_memory("formulation", &SearchOptions::default())
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        ctx.service.store().get_conversation(&conversation.id).unwrap().content,
        "a completely new formulation"
    );

    ctx.service.delete_memory(&conversation.id, true).unwrap();
    assert_eq!(
        ctx.service.delete_memory(&conversation.id, true).unwrap_err().kind(),
        "not_found"
    );
    for mode in [SearchMode::Keyword, SearchMode::Hybrid] {
        assert!(ctx
            .service
            .search_memory(
                "formulation",
                &SearchOptions { search_type: mode, ..Default::default() }
            )
            .unwrap()
            .is_empty());
    }
}

#[test]
fn session_summary_links_members_bidirectionally() {
    let ctx = TestContext::new();
    let problem = ctx
        .service
        .store_context("why does the cache always go stale?", "claude", None, None, vec![])
        .unwrap();
    let solution = ctx
        .service
        .store_context(
            "cache staleness fixed, the root cause was the ttl config",
            "claude",
            None,
            None,
            vec![],
        )
        .unwrap();

    let (summary, analysis) = ctx
        .service
        .create_session_summary(&[problem.id.clone(), solution.id.clone()], "engram")
        .unwrap();
    assert!(summary.tags.contains(&"session_summary".to_string()));
    assert_eq!(analysis.problem_solution_pairs.len(), 1);

    let summary_links = ctx.service.store().links_for(&summary.id).unwrap();
    assert_eq!(summary_links.len(), 4, "two directed links per member");
    let member_links = ctx.service.store().links_for(&problem.id).unwrap();
    assert!(member_links.len() >= 2);
}
