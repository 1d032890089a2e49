use sqlx::PgPool;

use stormboard_core::note::{Category, Note, NoteStatus, NoteType, Quadrant};
use stormboard_core::session::CreateSession;
use stormboard_core::types::DEFAULT_SESSION_ID;
use stormboard_core::user::{User, UserRole, UserStatus};
use stormboard_db::repositories::{NoteRepo, SessionRepo, UserRepo};

fn user(id: &str, phone: &str) -> User {
    User {
        id: id.into(),
        name: format!("user {id}"),
        phone: phone.into(),
        status: UserStatus::Pending,
        role: UserRole::User,
    }
}

fn note(id: &str, note_type: NoteType) -> Note {
    Note {
        id: id.into(),
        content: format!("content of {id}"),
        author: "Ana".into(),
        avatar_url: None,
        category: Category::Process,
        note_type,
        quadrant: Quadrant::Unsorted,
        status: NoteStatus::Active,
        timestamp: chrono::Utc::now(),
        likes: 0,
        linked_note_ids: vec![],
        merged_from_ids: vec![],
        created_by_user_id: None,
        created_by_phone: None,
        created_by_name: None,
        session_id: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn default_session_is_seeded(pool: PgPool) {
    let session = SessionRepo::find_by_id(&pool, DEFAULT_SESSION_ID)
        .await
        .unwrap()
        .expect("default session must exist after migration");
    assert!(session.is_active);
}

#[sqlx::test(migrations = "./migrations")]
async fn first_user_is_admin_second_is_pending(pool: PgPool) {
    let first = UserRepo::register(&pool, &user("u1", "0811111111"))
        .await
        .unwrap();
    assert_eq!(first.status, UserStatus::Approved);
    assert_eq!(first.role, UserRole::Admin);

    let second = UserRepo::register(&pool, &user("u2", "0822222222"))
        .await
        .unwrap();
    assert_eq!(second.status, UserStatus::Pending);
    assert_eq!(second.role, UserRole::User);
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_phone_keeps_the_stored_row(pool: PgPool) {
    UserRepo::register(&pool, &user("u1", "0811111111"))
        .await
        .unwrap();
    UserRepo::register(&pool, &user("u2", "0822222222"))
        .await
        .unwrap();
    UserRepo::approve(&pool, "u2", UserRole::Admin).await.unwrap();

    // Re-registering the same phone under a new id is ignored; the ack
    // payload reflects the stored (approved) row.
    let stored = UserRepo::register(&pool, &user("u3", "0822222222"))
        .await
        .unwrap();
    assert_eq!(stored.id, "u2");
    assert_eq!(stored.status, UserStatus::Approved);
    assert_eq!(stored.role, UserRole::Admin);
    assert_eq!(UserRepo::count(&pool).await.unwrap(), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn pending_listing_and_moderation(pool: PgPool) {
    UserRepo::register(&pool, &user("u1", "0811111111"))
        .await
        .unwrap();
    UserRepo::register(&pool, &user("u2", "0822222222"))
        .await
        .unwrap();
    UserRepo::register(&pool, &user("u3", "0833333333"))
        .await
        .unwrap();

    let pending = UserRepo::list_pending(&pool).await.unwrap();
    assert_eq!(pending.len(), 2); // the first user was auto-approved

    assert!(UserRepo::approve(&pool, "u2", UserRole::User).await.unwrap());
    assert_eq!(UserRepo::list_pending(&pool).await.unwrap().len(), 1);

    assert!(UserRepo::delete(&pool, "u3").await.unwrap());
    assert!(UserRepo::find_by_id(&pool, "u3").await.unwrap().is_none());
    // Deleting again is a no-op.
    assert!(!UserRepo::delete(&pool, "u3").await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn notes_are_scoped_by_session(pool: PgPool) {
    let side_session = CreateSession {
        id: "sprint-12".into(),
        name: "Sprint 12".into(),
        description: String::new(),
        created_by: "u1".into(),
    };
    SessionRepo::create(&pool, &side_session).await.unwrap();

    NoteRepo::insert(&pool, &note("n1", NoteType::Problem), DEFAULT_SESSION_ID)
        .await
        .unwrap();
    NoteRepo::insert(&pool, &note("n2", NoteType::Problem), "sprint-12")
        .await
        .unwrap();

    let default_notes = NoteRepo::list_by_session(&pool, DEFAULT_SESSION_ID)
        .await
        .unwrap();
    assert_eq!(default_notes.len(), 1);
    assert_eq!(default_notes[0].id, "n1");
    assert_eq!(default_notes[0].session_id.as_deref(), Some(DEFAULT_SESSION_ID));

    let sprint_notes = NoteRepo::list_by_session(&pool, "sprint-12").await.unwrap();
    assert_eq!(sprint_notes.len(), 1);
    assert_eq!(sprint_notes[0].id, "n2");
}

#[sqlx::test(migrations = "./migrations")]
async fn note_updates_round_trip(pool: PgPool) {
    NoteRepo::insert(&pool, &note("n1", NoteType::Problem), DEFAULT_SESSION_ID)
        .await
        .unwrap();

    assert!(NoteRepo::update_quadrant(&pool, "n1", Quadrant::Q2)
        .await
        .unwrap());
    assert!(NoteRepo::update_status(&pool, "n1", NoteStatus::Merged)
        .await
        .unwrap());
    assert!(NoteRepo::update_links(&pool, "n1", &["s1".to_owned()])
        .await
        .unwrap());
    assert!(NoteRepo::update_likes(&pool, "n1", 4).await.unwrap());
    assert!(NoteRepo::update_merge_target(
        &pool,
        "n1",
        "combined content",
        &["n9".to_owned()],
        7
    )
    .await
    .unwrap());

    let notes = NoteRepo::list_by_session(&pool, DEFAULT_SESSION_ID)
        .await
        .unwrap();
    let stored = &notes[0];
    assert_eq!(stored.quadrant, Quadrant::Q2);
    assert_eq!(stored.status, NoteStatus::Merged);
    assert_eq!(stored.linked_note_ids, vec!["s1".to_owned()]);
    assert_eq!(stored.merged_from_ids, vec!["n9".to_owned()]);
    assert_eq!(stored.content, "combined content");
    assert_eq!(stored.likes, 7);

    // Updates against a missing id report no rows touched.
    assert!(!NoteRepo::update_likes(&pool, "ghost", 1).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn stats_exclude_merged_notes(pool: PgPool) {
    let mut p1 = note("p1", NoteType::Problem);
    p1.quadrant = Quadrant::Q1;
    let mut p2 = note("p2", NoteType::Problem);
    p2.status = NoteStatus::Resolved;
    let mut p3 = note("p3", NoteType::Problem);
    p3.status = NoteStatus::Merged;
    let s1 = note("s1", NoteType::Solution);

    for n in [&p1, &p2, &p3, &s1] {
        NoteRepo::insert(&pool, n, DEFAULT_SESSION_ID).await.unwrap();
    }

    let stats = SessionRepo::stats(&pool, DEFAULT_SESSION_ID).await.unwrap();
    assert_eq!(stats.total_problems, 2); // p3 merged away
    assert_eq!(stats.resolved_problems, 1);
    assert_eq!(stats.active_problems, 1);
    assert_eq!(stats.total_solutions, 1);

    let q1 = stats
        .quadrant_breakdown
        .iter()
        .find(|q| q.quadrant == "Q1")
        .unwrap();
    assert_eq!(q1.count, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_session_id_is_an_error(pool: PgPool) {
    let input = CreateSession {
        id: "retro".into(),
        name: "Retro".into(),
        description: String::new(),
        created_by: "u1".into(),
    };
    SessionRepo::create(&pool, &input).await.unwrap();
    assert!(SessionRepo::create(&pool, &input).await.is_err());
}
