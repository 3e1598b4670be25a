use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    EngineEvent, EngineSettings, HttpIndexerClient, HttpLedgerGateway, ReconciliationScheduler,
    StaticWallet, SubjectView,
};
use shared::domain::{SubjectId, VoteDirection};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Vote on subjects with optimistic local updates")]
struct Args {
    /// Settings file; defaults to ./vote_client.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List subjects by score.
    List,
    /// Show one subject and its content.
    Show { subject_id: i64 },
    /// Cast a vote and wait for it to confirm.
    Vote {
        subject_id: i64,
        #[arg(value_enum)]
        direction: DirectionArg,
    },
    /// Keep refreshing and print engine events until interrupted.
    Watch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DirectionArg {
    Like,
    Dislike,
}

impl From<DirectionArg> for VoteDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Like => VoteDirection::Like,
            DirectionArg::Dislike => VoteDirection::Dislike,
        }
    }
}

fn print_view(view: &SubjectView) {
    let mark = view.mark.map_or("-", VoteDirection::as_str);
    println!(
        "#{:<6} +{:<6} -{:<6} {:<14} {:<8} creator={} you={mark}",
        view.subject.subject_id.0,
        view.likes,
        view.dislikes,
        view.subject.ownership.label(),
        if view.subject.immutable { "locked" } else { "mutable" },
        view.subject.creator,
    );
}

async fn refresh_or_warn(scheduler: &ReconciliationScheduler) {
    if let Err(err) = scheduler.refresh().await {
        warn!("{err}; continuing with stale data");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let settings = EngineSettings::load(args.config.as_deref())?;

    let gateway = Arc::new(HttpLedgerGateway::new(settings.ledger_url.clone()));
    let scheduler = ReconciliationScheduler::new_with_dependencies(
        &settings,
        Arc::new(HttpIndexerClient::new(settings.indexer_url.clone())),
        gateway.clone(),
        gateway,
        Arc::new(StaticWallet::new(settings.wallet_account.clone())),
    );

    match args.command {
        Command::List => {
            refresh_or_warn(&scheduler).await;
            for view in scheduler.subjects().await {
                print_view(&view);
            }
        }
        Command::Show { subject_id } => {
            let subject_id = SubjectId(subject_id);
            refresh_or_warn(&scheduler).await;
            let view = scheduler
                .subject(subject_id)
                .await
                .ok_or_else(|| anyhow!("subject {subject_id} is not in the catalog"))?;
            print_view(&view);

            scheduler.content().set_active(subject_id).await;
            scheduler.content().settle().await;
            if let Some((_, content)) = scheduler.content().displayed().await {
                println!("{}", content.body);
            }
        }
        Command::Vote {
            subject_id,
            direction,
        } => {
            let subject_id = SubjectId(subject_id);
            refresh_or_warn(&scheduler).await;
            let report = scheduler
                .request_vote(subject_id, direction.into())
                .await?;
            info!(
                subject_id = subject_id.0,
                handle = %report.vote.receipt.handle,
                reconciled = report.reconciled,
                "vote confirmed"
            );
            if let Some(view) = scheduler.subject(subject_id).await {
                print_view(&view);
            }
        }
        Command::Watch => {
            let mut events = scheduler.subscribe_events();
            let refresher = scheduler.spawn_periodic_refresh();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(EngineEvent::CatalogRefreshed { subjects }) => {
                            println!("-- refreshed {subjects} subjects");
                            for view in scheduler.subjects().await {
                                print_view(&view);
                            }
                            let pending = scheduler.manager().pending_subjects().await;
                            if !pending.is_empty() {
                                let ids: Vec<String> =
                                    pending.iter().map(ToString::to_string).collect();
                                println!("-- awaiting indexer: {}", ids.join(", "));
                            }
                        }
                        Ok(other) => println!("-- {other:?}"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("event stream lagged by {skipped} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            refresher.abort();
        }
    }

    Ok(())
}
