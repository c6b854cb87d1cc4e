use std::sync::Arc;

use invitebot_core::{
    config::Config,
    ledger::InvitationLedger,
    streaming::StreamingConnector,
    workflow::InvitationWorkflow,
    Result,
};
use invitebot_mastodon::{MastodonClient, WebSocketTransport};
use invitebot_postgres::PgInviteStore;

#[tokio::main]
async fn main() -> Result<()> {
    invitebot_core::logging::init("invitebot")?;

    let cfg = Config::load()?;

    let client = MastodonClient::new(
        cfg.instance_url.clone(),
        cfg.access_token.clone(),
        cfg.http_timeout,
    )?;
    let me = client.verify_credentials().await?;
    tracing::info!(
        username = %me.username,
        instance = %cfg.instance_url,
        channel = %cfg.stream_channel,
        "invitebot started"
    );

    let pool = invitebot_postgres::connect(&cfg.database).await?;
    invitebot_postgres::run_migrations(&pool).await?;

    let ledger = InvitationLedger::new(
        Arc::new(PgInviteStore::new(pool.clone())),
        cfg.invite_creator.clone(),
    );
    let workflow = InvitationWorkflow::new(me.username.clone(), ledger, Arc::new(client.clone()));
    let mut connector = StreamingConnector::subscribe(
        Arc::new(WebSocketTransport::new(client)),
        cfg.stream_channel,
        cfg.reconnect,
    );

    let result = tokio::select! {
        res = run(&mut connector, &workflow) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    pool.close().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "streaming stopped");
    }
    result
}

/// Pull events one at a time and hand each to the workflow before the next.
async fn run(connector: &mut StreamingConnector, workflow: &InvitationWorkflow) -> Result<()> {
    loop {
        let event = connector.next_event().await?;
        workflow.on_event(&event).await;
    }
}
