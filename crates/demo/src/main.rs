use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use serde_json::json;
use tracing::info;

use replaykit_core::{Aggregate, AggregateId, ExpectedVersion};
use replaykit_demo::OrderFeedEntryHandler;
use replaykit_events::FeedRunner;
use replaykit_game::{Answer, Game, Player};
use replaykit_infra::event_log::{EventLog, InMemoryEventLog, NewEvent};
use replaykit_infra::projections::shipping_stats::{
    ORDER_FEED, SHIPPING_STATS_PROJECTION, ShippingStats, shipping_stats_projection,
};
use replaykit_infra::projections::todo_lists::{LISTS_PROJECTION, lists_projection};
use replaykit_infra::projections::{InMemoryDocumentStore, ProjectionDocument};
use replaykit_infra::{EngineConfig, EngineContext};
use replaykit_todo::{LIST_TYPE, TodoList};

type DemoContext = EngineContext<Arc<InMemoryEventLog>, Arc<InMemoryDocumentStore>>;

fn main() -> anyhow::Result<()> {
    replaykit_observability::init();

    let config = EngineConfig::from_env()?;
    let ctx = EngineContext::in_memory(config);

    ctx.register_projection(lists_projection()?);
    ctx.register_projection(shipping_stats_projection()?);

    let worker = ctx
        .spawn_projection_worker("list-projection-worker", LIST_TYPE)
        .context("failed to spawn projection worker")?;

    // Todo lists
    let lists = ctx.aggregate_client::<TodoList>(replaykit_todo::reducer()?);
    let list_id = AggregateId::new();
    lists.create(list_id, |list: &TodoList| list.create_new(list_id, "Groceries"))?;
    lists.update(list_id, |list: &TodoList| list.add_todo("milk", "Buy milk"))?;
    lists.update(list_id, |list: &TodoList| list.add_todo("bread", "Buy bread"))?;
    lists.update(list_id, |list: &TodoList| list.complete_todo("milk"))?;

    let document = wait_for_version(&ctx, &list_id.to_string(), 4)?;
    info!(list = %document.data(), "lists projection");

    let in_progress = ctx.projections().list(LISTS_PROJECTION, Some("IN_PROGRESS"))?;
    info!(count = in_progress.len(), "lists in progress");

    if let Some(cursor) = worker.shutdown() {
        info!(feed = cursor.feed(), position = cursor.last_sequence_number(), "projection worker stopped");
    }

    // Rock paper scissors
    let games = ctx.aggregate_client::<Game>(replaykit_game::reducer()?);
    let game_id = AggregateId::new();
    let (lisa, bob) = (Player::from("lisa"), Player::from("bob"));
    games.create(game_id, |game: &Game| game.start_game(game_id, lisa.clone(), bob.clone()))?;
    for (first, second) in [(Answer::Rock, Answer::Paper), (Answer::Scissors, Answer::Rock)] {
        games.update(game_id, |game: &Game| game.show_hand(lisa.clone(), first))?;
        games.update(game_id, |game: &Game| game.show_hand(bob.clone(), second))?;
    }
    let game = Game::from_state(games.load(game_id)?.state);
    info!(
        winner = game.state().winner().map(Player::name),
        rounds = game.state().round(),
        "game finished"
    );

    // Orders
    let timeout = ctx.config().request_timeout;
    for (i, tracking) in ["TRK-1001", "TRK-1002"].into_iter().enumerate() {
        let order_id = AggregateId::new();
        ctx.log().append(
            ORDER_FEED,
            order_id,
            ExpectedVersion::NoStream,
            vec![
                NewEvent::new(
                    "OrderPlacedEvent",
                    json!({ "orderId": order_id.to_string(), "customerId": format!("customer-{i}") }),
                ),
                NewEvent::new(
                    "PaymentReceivedEvent",
                    json!({ "orderId": order_id.to_string(), "amountPaid": 200 }),
                ),
                NewEvent::new("OrderFullyPaidEvent", json!({ "orderId": order_id.to_string() })),
                NewEvent::new(
                    "OrderShippedEvent",
                    json!({ "orderId": order_id.to_string(), "trackingNumber": tracking }),
                ),
            ],
            timeout,
        )?;
    }

    let entries = ctx
        .log()
        .read_feed(ORDER_FEED, 0, ctx.config().feed_batch_size, timeout)?;
    let mut printer = FeedRunner::new(ORDER_FEED, OrderFeedEntryHandler::default());
    printer.run(&entries)?;

    ctx.catch_up(ORDER_FEED)?;
    let stats = ShippingStats::from_document(&ctx.projections().get_aggregated(SHIPPING_STATS_PROJECTION)?)?;
    info!(
        shipped = stats.shipped_orders_count,
        tracking_numbers = ?stats.tracking_numbers,
        "shipping stats"
    );

    Ok(())
}

/// Poll the lists projection until the worker has applied `version`.
fn wait_for_version(ctx: &DemoContext, id: &str, version: u64) -> anyhow::Result<ProjectionDocument> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(document) = ctx.projections().get(LISTS_PROJECTION, id) {
            if document.last_applied() >= version {
                return Ok(document);
            }
        }
        if Instant::now() >= deadline {
            bail!("projection for list {id} did not reach version {version}");
        }
        thread::sleep(Duration::from_millis(10));
    }
}
