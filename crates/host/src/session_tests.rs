// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn active_project_is_per_user() {
    let store = SessionStore::new();
    store.set_active_project("alice", Some("proj-1"));
    store.set_active_project("bob", Some("proj-2"));

    assert_eq!(store.active_project("alice").as_deref(), Some("proj-1"));
    assert_eq!(store.active_project("bob").as_deref(), Some("proj-2"));
    assert_eq!(store.active_project("carol"), None);
}

#[test]
fn clearing_removes_the_entry() {
    let store = SessionStore::new();
    store.set_active_project("alice", Some("proj-1"));
    store.set_active_project("alice", None);
    assert_eq!(store.active_project("alice"), None);
}

#[yare::parameterized(
    with_project = { Some("proj-9"), "project_proj-9_documents" },
    without      = { None, "arkham_documents" },
)]
fn collection_scoping(project: Option<&str>, expected: &str) {
    let store = SessionStore::new();
    if let Some(project) = project {
        store.set_active_project("alice", Some(project));
    }
    assert_eq!(store.collection_name("documents", Some("alice")), expected);
}

#[test]
fn collection_name_without_user_is_global() {
    let store = SessionStore::new();
    assert_eq!(store.collection_name("chunks", None), "arkham_chunks");
}

#[test]
fn project_collections_trio() {
    let store = SessionStore::new();
    let collections = store.project_collections(Some("abc"), None);
    assert_eq!(
        collections.get("documents").map(String::as_str),
        Some("project_abc_documents")
    );
    assert_eq!(
        collections.get("chunks").map(String::as_str),
        Some("project_abc_chunks")
    );
    assert_eq!(
        collections.get("entities").map(String::as_str),
        Some("project_abc_entities")
    );
}

#[test]
fn project_collections_fall_back_to_active_then_global() {
    let store = SessionStore::new();
    store.set_active_project("alice", Some("live"));

    let via_user = store.project_collections(None, Some("alice"));
    assert_eq!(
        via_user.get("documents").map(String::as_str),
        Some("project_live_documents")
    );

    let global = store.project_collections(None, None);
    assert_eq!(
        global.get("entities").map(String::as_str),
        Some("arkham_entities")
    );
}
