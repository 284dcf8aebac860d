use tracing::info;

use boxroom_core::BoxStore;
use boxroom_gateway::LocalStore;
use boxroom_types::BoxError;
use boxroom_types::models::ReactionKind;

pub const DEMO_BOX: &str = "demo";

/// Create the demo box with two users and one post, unless it exists.
pub async fn demo_box(store: &LocalStore) -> anyhow::Result<()> {
    match store.fetch_box(DEMO_BOX).await {
        Ok(_) => {
            info!("Demo box already present");
            return Ok(());
        }
        Err(BoxError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    store.create_user("u1", "ann@example.com", "Ann", None).await?;
    store.create_user("u2", "bo@example.com", "Bo", None).await?;
    store.create_box(DEMO_BOX, "u1").await?;
    store.enroll(DEMO_BOX, "u2").await?;

    let name = format!("{}.jpg", chrono::Utc::now().timestamp_millis());
    let key = store
        .create_post(DEMO_BOX, "u1", &name, "https://example.com/welcome.jpg")
        .await?;
    store
        .toggle_reaction(DEMO_BOX, &key, "u2", ReactionKind::Love)
        .await?;

    info!("Seeded demo box '{}' (author u1, member u2)", DEMO_BOX);
    Ok(())
}
