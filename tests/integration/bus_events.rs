use crate::common::{
    distributed_read, distributed_write, enroll_host, host_id_for, queue_campaign, seed_org,
    test_client,
};
use queryops::bus::{Delivery, PubSub, Subscription};
use queryops::events::{CampaignResultEvent, QueryResultEvent, campaign_topic, host_topic};
use rocket::tokio::runtime::Runtime;
use rocket::tokio::time::timeout;
use std::time::Duration;

fn next_delivery(rt: &Runtime, sub: &mut Subscription, wait: Duration) -> Option<Delivery> {
    rt.block_on(async { timeout(wait, sub.next()).await }).ok().flatten()
}

#[test]
fn test_successful_write_publishes_once_per_topic() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    let node_key = enroll_host(&client, &seed.enroll_secret, "h1");
    let host_id = host_id_for(&client, &seed.api_token, "h1");
    let campaign = queue_campaign(&client, &seed.api_token, "select 1", &[&host_id]);
    let campaign_id = campaign["id"].as_str().unwrap().to_string();
    distributed_read(&client, &node_key);

    let pubsub = client.rocket().state::<PubSub>().expect("pubsub managed");
    let bus = pubsub.bus.as_ref().expect("embedded bus running");
    let rt = Runtime::new().unwrap();
    let mut host_sub = rt.block_on(bus.subscribe(&host_topic(&host_id))).unwrap();
    let mut campaign_sub = rt
        .block_on(bus.subscribe(&campaign_topic(&campaign_id)))
        .unwrap();

    distributed_write(
        &client,
        &node_key,
        &campaign_id,
        0,
        serde_json::json!([{"n": "1"}, {"n": "2"}]),
    );

    let delivery = next_delivery(&rt, &mut host_sub, Duration::from_secs(2))
        .expect("host topic delivery");
    let event: QueryResultEvent = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(event.host_id, host_id);
    assert_eq!(event.query_id, campaign_id);
    assert_eq!(event.status, "completed");
    assert!(event.error.is_none());
    delivery.ack();

    let delivery = next_delivery(&rt, &mut campaign_sub, Duration::from_secs(2))
        .expect("campaign topic delivery");
    let event: CampaignResultEvent = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(event.campaign_id, campaign_id);
    assert_eq!(event.host_identifier, "h1");
    assert_eq!(event.status, "completed");
    assert_eq!(event.row_count, 2);
    delivery.ack();

    // Exactly one publish per topic
    assert!(next_delivery(&rt, &mut host_sub, Duration::from_millis(300)).is_none());
    assert!(next_delivery(&rt, &mut campaign_sub, Duration::from_millis(300)).is_none());
}

#[test]
fn test_failed_status_carries_error_and_zero_rows() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    let node_key = enroll_host(&client, &seed.enroll_secret, "h1");
    let host_id = host_id_for(&client, &seed.api_token, "h1");
    let campaign = queue_campaign(&client, &seed.api_token, "select 1", &[&host_id]);
    let campaign_id = campaign["id"].as_str().unwrap().to_string();
    distributed_read(&client, &node_key);

    let pubsub = client.rocket().state::<PubSub>().unwrap();
    let bus = pubsub.bus.as_ref().unwrap();
    let rt = Runtime::new().unwrap();
    let mut campaign_sub = rt
        .block_on(bus.subscribe(&campaign_topic(&campaign_id)))
        .unwrap();

    distributed_write(&client, &node_key, &campaign_id, 1, serde_json::json!([]));

    let delivery = next_delivery(&rt, &mut campaign_sub, Duration::from_secs(2))
        .expect("campaign topic delivery");
    let event: CampaignResultEvent = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(event.status, "failed");
    assert_eq!(event.row_count, 0);
    assert_eq!(event.error.as_deref(), Some("osquery status 1"));
}

#[test]
fn test_failed_write_publishes_nothing() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    let node_key = enroll_host(&client, &seed.enroll_secret, "h1");
    let host_id = host_id_for(&client, &seed.api_token, "h1");

    let pubsub = client.rocket().state::<PubSub>().unwrap();
    let bus = pubsub.bus.as_ref().unwrap();
    let rt = Runtime::new().unwrap();
    let mut host_sub = rt.block_on(bus.subscribe(&host_topic(&host_id))).unwrap();

    // No such campaign target: the write is skipped and nothing is published
    distributed_write(
        &client,
        &node_key,
        "no-such-campaign",
        0,
        serde_json::json!([]),
    );

    assert!(next_delivery(&rt, &mut host_sub, Duration::from_millis(300)).is_none());
}

#[test]
fn test_nack_redelivers_to_subscribers() {
    let client = test_client();
    let pubsub = client.rocket().state::<PubSub>().unwrap();
    let bus = pubsub.bus.as_ref().unwrap();
    let rt = Runtime::new().unwrap();

    let mut sub = rt.block_on(bus.subscribe("campaign:redeliver-check")).unwrap();
    rt.block_on(bus.publish("campaign:redeliver-check", b"payload".to_vec()))
        .unwrap();

    let first = next_delivery(&rt, &mut sub, Duration::from_secs(1)).expect("first delivery");
    assert_eq!(first.payload, b"payload");
    rt.block_on(first.nack());

    let second = next_delivery(&rt, &mut sub, Duration::from_secs(1)).expect("redelivery");
    assert_eq!(second.payload, b"payload");
    second.ack();
}
