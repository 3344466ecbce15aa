use super::*;
use chrono::{Duration, Utc};
use pricewatch::{ItemStore, JsonStore, PriceSample, TrackedItem};

#[tokio::test]
async fn test_store_survives_reopen() -> anyhow::Result<()> {
    let (dir, store) = temp_store();

    // 1. Track two items and record a price for one of them
    let mut coffee = make_item("Кафемашина", "https://shop.example.bg/p/1", ".price");
    coffee.current_price = Some(349.99);
    let vacuum = make_item("Прахосмукачка", "https://shop.example.bg/p/2", "#price");

    store.save_item(&coffee).await?;
    store.save_item(&vacuum).await?;
    store
        .append_sample(&PriceSample::new(coffee.id.clone(), 349.99))
        .await?;
    println!("✓ Saved two items and one sample");

    // 2. Drop the store handle and open a fresh one over the same files
    drop(store);
    let reopened = JsonStore::new(dir.path())?;

    let items = reopened.list_items().await?;
    assert_eq!(items.len(), 2);

    let loaded = reopened.get_item(&coffee.id).await?.expect("coffee item");
    assert_eq!(loaded.name, "Кафемашина");
    assert_eq!(loaded.current_price, Some(349.99));

    let history = reopened.samples_for(&coffee.id, None).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price, 349.99);
    println!("✓ Reopened store sees the same items and history");

    Ok(())
}

#[tokio::test]
async fn test_remove_cascades_history_but_spares_others() -> anyhow::Result<()> {
    let (_dir, store) = temp_store();

    let keep = make_item("остава", "https://shop.example.bg/p/keep", ".price");
    let drop_me = make_item("изтрит", "https://shop.example.bg/p/drop", ".price");
    store.save_item(&keep).await?;
    store.save_item(&drop_me).await?;

    for price in [100.0, 95.0] {
        store
            .append_sample(&PriceSample::new(keep.id.clone(), price))
            .await?;
        store
            .append_sample(&PriceSample::new(drop_me.id.clone(), price))
            .await?;
    }

    // Removing one item takes its history with it and nothing else
    assert!(store.delete_item(&drop_me.id).await?);
    assert!(store.samples_for(&drop_me.id, None).await?.is_empty());
    assert_eq!(store.samples_for(&keep.id, None).await?.len(), 2);
    assert!(store.get_item(&keep.id).await?.is_some());

    // A second delete of the same id reports that nothing existed
    assert!(!store.delete_item(&drop_me.id).await?);

    Ok(())
}

#[tokio::test]
async fn test_history_is_newest_first() -> anyhow::Result<()> {
    let (_dir, store) = temp_store();

    let item = make_item("Телевизор", "https://shop.example.bg/p/tv", ".price");
    store.save_item(&item).await?;

    // Appended out of order on purpose; the store sorts on read
    let now = Utc::now();
    for (minutes_ago, price) in [(20i64, 480.0), (30, 500.0), (10, 450.0)] {
        let mut sample = PriceSample::new(item.id.clone(), price);
        sample.recorded_at = now - Duration::minutes(minutes_ago);
        store.append_sample(&sample).await?;
    }

    let all = store.samples_for(&item.id, None).await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].price, 450.0);
    assert_eq!(all[2].price, 500.0);

    let limited = store.samples_for(&item.id, Some(2)).await?;
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[1].price, 480.0);

    Ok(())
}

#[tokio::test]
async fn test_data_files_stay_hand_editable() -> anyhow::Result<()> {
    let (dir, store) = temp_store();

    let mut item = make_item("Лаптоп", "https://shop.example.bg/p/laptop", ".price");
    item.target_price = Some(1500.0);
    store.save_item(&item).await?;

    // 1. The file on disk is pretty-printed JSON
    let items_path = dir.path().join("items.json");
    let raw = std::fs::read_to_string(&items_path)?;
    assert!(raw.contains('\n'), "items.json should be pretty-printed");
    assert!(raw.contains("Лаптоп"));
    println!("✓ items.json is readable JSON");

    // 2. Edits made by hand show up on the next read
    let mut items: Vec<TrackedItem> = serde_json::from_str(&raw)?;
    items[0].target_price = Some(1200.0);
    std::fs::write(&items_path, serde_json::to_string_pretty(&items)?)?;

    let loaded = store.get_item(&item.id).await?.expect("edited item");
    assert_eq!(loaded.target_price, Some(1200.0));
    println!("✓ Hand edit visible through the store");

    Ok(())
}
