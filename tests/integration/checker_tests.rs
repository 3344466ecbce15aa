use super::*;
use std::sync::Arc;

use pricewatch::config::CheckerConfig;
use pricewatch::{BackgroundChecker, CheckEvent, HttpFetcher, ItemStore};
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn checker_config(render_fallback: bool) -> CheckerConfig {
    CheckerConfig {
        interval_minutes: 60,
        render_fallback,
    }
}

#[tokio::test]
async fn test_cycle_against_live_pages() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    serve_page(&server, "/coffee", price_page("349,99 лв.")).await;
    serve_page(&server, "/vacuum", price_page("189 лв.")).await;

    let (_dir, store) = temp_store();
    let coffee = make_item("Кафемашина", &format!("{}/coffee", server.uri()), ".price");
    let vacuum = make_item("Прахосмукачка", &format!("{}/vacuum", server.uri()), ".price");
    store.save_item(&coffee).await?;
    store.save_item(&vacuum).await?;

    let light = Arc::new(HttpFetcher::new(test_http_config())?);
    let rendered = Arc::new(FixedPriceFetcher::new(None));
    let checker = BackgroundChecker::new(
        store.clone(),
        light,
        rendered.clone(),
        &checker_config(false),
    );

    let results = checker.check_all().await?;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.succeeded));

    // Prices landed in the store with history behind them
    let coffee_after = store.get_item(&coffee.id).await?.expect("coffee item");
    assert_eq!(coffee_after.current_price, Some(349.99));
    assert!(coffee_after.last_checked_at.is_some());
    assert_eq!(store.samples_for(&vacuum.id, None).await?.len(), 1);

    // Plain pages never involved the browser side
    assert_eq!(rendered.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_escalation_reaches_rendered_fetcher() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    // The served page carries no price element the selector can find
    serve_page(&server, "/scripted", price_page("")).await;

    let (_dir, store) = temp_store();
    let item = make_item(
        "Скриптова страница",
        &format!("{}/scripted", server.uri()),
        ".js-price",
    );
    store.save_item(&item).await?;

    let light = Arc::new(HttpFetcher::new(test_http_config())?);
    let rendered = Arc::new(FixedPriceFetcher::new(Some(65.0)));
    let checker =
        BackgroundChecker::new(store.clone(), light, rendered.clone(), &checker_config(true));

    let results = checker.check_all().await?;
    assert!(results[0].succeeded);
    assert_eq!(results[0].new_price, Some(65.0));
    assert_eq!(rendered.calls(), 1);

    let stored = store.get_item(&item.id).await?.expect("item");
    assert_eq!(stored.current_price, Some(65.0));

    Ok(())
}

#[tokio::test]
async fn test_render_required_skips_http_entirely() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    // Nothing may request this route; the item goes straight to the browser
    Mock::given(method("GET"))
        .and(path("/browser-only"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, store) = temp_store();
    let mut item = make_item(
        "Браузърна страница",
        &format!("{}/browser-only", server.uri()),
        ".price",
    );
    item.render_required = true;
    store.save_item(&item).await?;

    let light = Arc::new(HttpFetcher::new(test_http_config())?);
    let rendered = Arc::new(FixedPriceFetcher::new(Some(42.0)));
    let checker =
        BackgroundChecker::new(store.clone(), light, rendered.clone(), &checker_config(false));

    let results = checker.check_all().await?;
    assert!(results[0].succeeded);
    assert_eq!(results[0].new_price, Some(42.0));
    assert_eq!(rendered.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_failed_item_leaves_store_untouched() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    serve_page(&server, "/item", price_page("100,00 лв.")).await;

    let (_dir, store) = temp_store();
    let mut item = make_item("Без цена", &format!("{}/item", server.uri()), ".absent");
    item.current_price = Some(100.0);
    store.save_item(&item).await?;

    let light = Arc::new(HttpFetcher::new(test_http_config())?);
    let rendered = Arc::new(FixedPriceFetcher::new(None));
    let checker =
        BackgroundChecker::new(store.clone(), light, rendered.clone(), &checker_config(false));

    let results = checker.check_all().await?;
    assert!(!results[0].succeeded);
    assert_eq!(
        results[0].failure_reason.as_deref(),
        Some("price not extractable")
    );

    // The stored record still looks exactly as before the cycle
    let stored = store.get_item(&item.id).await?.expect("item");
    assert_eq!(stored.current_price, Some(100.0));
    assert!(stored.last_checked_at.is_none());
    assert!(store.samples_for(&item.id, None).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_events_follow_processing_order() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    serve_page(&server, "/good", price_page("25,50 лв.")).await;
    serve_page(&server, "/bad", price_page("")).await;

    let (_dir, store) = temp_store();
    let good = make_item("добър", &format!("{}/good", server.uri()), ".price");
    let bad = make_item("лош", &format!("{}/bad", server.uri()), ".missing");
    store.save_item(&good).await?;
    store.save_item(&bad).await?;

    let light = Arc::new(HttpFetcher::new(test_http_config())?);
    let rendered = Arc::new(FixedPriceFetcher::new(None));
    let checker =
        BackgroundChecker::new(store.clone(), light, rendered, &checker_config(false));

    let mut events = checker.subscribe();
    checker.check_all().await?;

    match events.try_recv()? {
        CheckEvent::PriceUpdate(update) => {
            assert_eq!(update.item.id, good.id);
            assert_eq!(update.new_price, Some(25.5));
        }
        other => panic!("expected PriceUpdate, got {other:?}"),
    }
    match events.try_recv()? {
        CheckEvent::CycleComplete { succeeded, total } => {
            assert_eq!(succeeded, 1);
            assert_eq!(total, 2);
        }
        other => panic!("expected CycleComplete, got {other:?}"),
    }
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    Ok(())
}
