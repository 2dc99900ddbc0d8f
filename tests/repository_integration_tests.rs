use party_qna::{
    error::ServiceError,
    identity,
    models::{
        Choice, GameCategory, GameCategoryChoice, GameRoomCreate, GameRoomUpdate, GameType,
        GameTypeChoice, PlayerCreate, PlayerUpdate, QnACategory, QuestionCreate, RankingCreate,
        RankingUpdate, ReferenceCreate, ReferenceUpdate, ScoreEntry, User, UserCreate,
    },
    policy::Visibility,
    repository::{
        DEFAULT_ROUNDS, EnumRepository, GameRoomRepository, PlayerRepository, RankingRepository,
        Repository, populate_references,
    },
    store::{MemoryStore, Page, Store, Transaction},
    versioning::QuestionRepository,
};

// --- Test Context and Setup ---

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    populate_references(&store).await.unwrap();
    store
}

async fn create_test_user(tx: &mut dyn Transaction, username: &str) -> User {
    let account = identity::prepare_account(
        UserCreate {
            username: username.to_string(),
            password: "secret-pw".to_string(),
        },
        4,
    )
    .await
    .unwrap();
    identity::register(tx, account).await.unwrap()
}

fn room(question_ids: Vec<i32>) -> GameRoomCreate {
    GameRoomCreate {
        game_type_id: 1,
        game_category_id: 1,
        question_ids,
        ..GameRoomCreate::default()
    }
}

// --- Reference Tables ---

#[tokio::test]
async fn test_populate_is_idempotent() {
    let store = seeded_store().await;
    populate_references(&store).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let types = EnumRepository::<GameType>::default()
        .list(tx.as_mut(), Page::default(), Visibility::Public)
        .await
        .unwrap();
    let names: Vec<GameTypeChoice> = types.iter().map(|t| t.name).collect();
    assert_eq!(names, GameTypeChoice::ALL.to_vec());

    let categories = EnumRepository::<GameCategory>::default()
        .list(tx.as_mut(), Page::default(), Visibility::Public)
        .await
        .unwrap();
    assert_eq!(categories.len(), GameCategoryChoice::ALL.len());

    let qna = EnumRepository::<QnACategory>::default()
        .list(tx.as_mut(), Page::default(), Visibility::Public)
        .await
        .unwrap();
    assert_eq!(qna.len(), 2);
}

#[tokio::test]
async fn test_reference_names_are_unique() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let repo = EnumRepository::<GameType>::default();

    let err = repo
        .create(
            tx.as_mut(),
            ReferenceCreate {
                name: GameTypeChoice::Ego,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn test_reference_delete_and_recreate() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let repo = EnumRepository::<GameCategory>::default();

    let mixed = repo
        .list(tx.as_mut(), Page::default(), Visibility::Public)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == GameCategoryChoice::Mixed)
        .unwrap();
    repo.delete(tx.as_mut(), mixed.clone()).await.unwrap();

    let err = repo
        .get_by_id(tx.as_mut(), mixed.id, Visibility::Staff)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { entity: "game_category", .. }));

    let again = repo
        .create(
            tx.as_mut(),
            ReferenceCreate {
                name: GameCategoryChoice::Mixed,
            },
        )
        .await
        .unwrap();
    assert!(again.id > mixed.id);
}

#[tokio::test]
async fn test_referenced_game_category_cannot_be_deleted() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let rooms = GameRoomRepository;
    rooms.create(tx.as_mut(), room(vec![])).await.unwrap();

    let repo = EnumRepository::<GameCategory>::default();
    let category = repo.get_by_id(tx.as_mut(), 1, Visibility::Staff).await.unwrap();
    let err = repo.delete(tx.as_mut(), category).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn test_reference_rename_within_allow_list() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let repo = EnumRepository::<GameType>::default();

    let ego = repo.get_by_id(tx.as_mut(), 1, Visibility::Staff).await.unwrap();
    // Renaming onto an existing name collides.
    let err = repo
        .update(
            tx.as_mut(),
            ego.clone(),
            ReferenceUpdate {
                name: Some(GameTypeChoice::NeverHaveIEver),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let unchanged = repo
        .update(tx.as_mut(), ego.clone(), ReferenceUpdate { name: None })
        .await
        .unwrap();
    assert_eq!(unchanged, ego);
}

// --- Players ---

#[tokio::test]
async fn test_player_stats_validation() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let alice = create_test_user(tx.as_mut(), "alice").await;
    let repo = PlayerRepository;

    let player = repo.get_by_id(tx.as_mut(), alice.id, Visibility::Public).await.unwrap();
    let updated = repo
        .update(
            tx.as_mut(),
            player.clone(),
            PlayerUpdate {
                games_played: Some(3),
                games_won: Some(2),
            },
        )
        .await
        .unwrap();
    assert_eq!((updated.games_played, updated.games_won), (3, 2));

    let err = repo
        .update(
            tx.as_mut(),
            updated,
            PlayerUpdate {
                games_won: Some(4),
                ..PlayerUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn test_player_requires_user() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();

    let err = PlayerRepository
        .create(
            tx.as_mut(),
            PlayerCreate {
                id: 42,
                games_played: None,
                games_won: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RelationNotFound { entity: "user", id: 42 }));
}

// --- Game Rooms ---

#[tokio::test]
async fn test_game_room_defaults_and_membership() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let alice = create_test_user(tx.as_mut(), "alice").await;
    let q = QuestionRepository
        .create(
            tx.as_mut(),
            QuestionCreate {
                text: "Q".to_string(),
                author_id: Some(alice.id),
                game_type_id: 1,
                game_category_id: 1,
                ..QuestionCreate::default()
            },
        )
        .await
        .unwrap();

    let created = GameRoomRepository
        .create(tx.as_mut(), room(vec![q.id, q.id]))
        .await
        .unwrap();
    assert_eq!(created.rounds, DEFAULT_ROUNDS);
    assert_eq!(created.cur_round, 0);
    assert_eq!(created.question_ids, vec![q.id]);

    let err = GameRoomRepository
        .create(tx.as_mut(), room(vec![999]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RelationNotFound { entity: "question", id: 999 }));
}

#[tokio::test]
async fn test_game_room_round_bounds() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let repo = GameRoomRepository;

    let created = repo
        .create(
            tx.as_mut(),
            GameRoomCreate {
                rounds: Some(3),
                ..room(vec![])
            },
        )
        .await
        .unwrap();

    let advanced = repo
        .update(
            tx.as_mut(),
            created.clone(),
            GameRoomUpdate {
                cur_round: Some(3),
                ..GameRoomUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(advanced.cur_round, 3);

    let err = repo
        .update(
            tx.as_mut(),
            advanced,
            GameRoomUpdate {
                cur_round: Some(4),
                ..GameRoomUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let err = repo
        .create(
            tx.as_mut(),
            GameRoomCreate {
                rounds: Some(0),
                ..room(vec![])
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn test_game_room_wrong_category_table() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();

    // Game rooms use game categories (three rows), not QnA categories.
    let err = GameRoomRepository
        .create(
            tx.as_mut(),
            GameRoomCreate {
                game_category_id: 4,
                ..room(vec![])
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RelationNotFound { entity: "game_category", id: 4 }));
}

// --- Rankings ---

#[tokio::test]
async fn test_ranking_scores_roundtrip_and_replace() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let alice = create_test_user(tx.as_mut(), "alice").await;
    let bob = create_test_user(tx.as_mut(), "bob").await;
    let game_room = GameRoomRepository.create(tx.as_mut(), room(vec![])).await.unwrap();
    let repo = RankingRepository;

    let ranking = repo
        .create(
            tx.as_mut(),
            RankingCreate {
                game_room_id: Some(game_room.id),
                scores: vec![
                    ScoreEntry { player_id: alice.id, points: 12.5 },
                    ScoreEntry { player_id: bob.id, points: 3.0 },
                ],
            },
        )
        .await
        .unwrap();
    assert_eq!(ranking.scores.len(), 2);
    assert!(ranking.scores.iter().all(|s| s.ranking_id == ranking.id));

    let updated = repo
        .update(
            tx.as_mut(),
            ranking.clone(),
            RankingUpdate {
                scores: Some(vec![ScoreEntry { player_id: bob.id, points: 20.0 }]),
                ..RankingUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.scores.len(), 1);
    assert_eq!(updated.scores[0].player_id, bob.id);
    assert_eq!(updated.game_room_id, Some(game_room.id));

    let stored = repo.get_by_id(tx.as_mut(), ranking.id, Visibility::Public).await.unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn test_ranking_guards() {
    let store = seeded_store().await;
    let mut tx = store.begin().await.unwrap();
    let alice = create_test_user(tx.as_mut(), "alice").await;
    let game_room = GameRoomRepository.create(tx.as_mut(), room(vec![])).await.unwrap();
    let repo = RankingRepository;

    let err = repo
        .create(
            tx.as_mut(),
            RankingCreate {
                game_room_id: None,
                scores: vec![ScoreEntry { player_id: 77, points: 1.0 }],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RelationNotFound { entity: "player", id: 77 }));

    let err = repo
        .create(
            tx.as_mut(),
            RankingCreate {
                game_room_id: None,
                scores: vec![ScoreEntry { player_id: alice.id, points: f64::NAN }],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    repo.create(
        tx.as_mut(),
        RankingCreate {
            game_room_id: Some(game_room.id),
            scores: vec![ScoreEntry { player_id: alice.id, points: 1.0 }],
        },
    )
    .await
    .unwrap();

    // Rooms and players referenced by a ranking stay.
    let err = GameRoomRepository.delete(tx.as_mut(), game_room).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    let player = PlayerRepository.get_by_id(tx.as_mut(), alice.id, Visibility::Public).await.unwrap();
    let err = PlayerRepository.delete(tx.as_mut(), player).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}
