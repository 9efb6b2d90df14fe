//! Demo command - Send events to a running server
//!
//! Exercises every message kind against the built-in analyses: class
//! loading, string and thread data, counted events, object frees and close.

use std::io::Write;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use shadowvm_client::{ClientConfig, NetReference, ObjectData, ShadowClient};
use shadowvm_config::{ClientSection, Config};

/// Demo command arguments
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Server address (host:port), overrides `client.address`
    #[arg(short, long)]
    pub address: Option<String>,

    /// Number of counted events to send
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub events: u32,

    /// Flush after every event
    #[arg(long)]
    pub flush_each_event: bool,
}

/// Runtime client settings from the `[client]` section
pub fn client_config(section: &ClientSection) -> ClientConfig {
    ClientConfig {
        buffer_size: section.buffer_size,
        flush_each_event: section.flush_each_event,
        ..Default::default()
    }
}

/// Run the demo command
pub async fn run(args: DemoArgs, config: Config) -> Result<()> {
    let address = args.address.unwrap_or(config.client.address.clone());
    let mut client_config = client_config(&config.client);
    client_config.flush_each_event |= args.flush_each_event;
    let events = args.events;

    info!(address = %address, events, "connecting to shadow server");

    let summary = tokio::task::spawn_blocking(move || {
        let client = ShadowClient::connect(address.as_str(), client_config)
            .with_context(|| format!("failed to connect to {address}"))?;
        send_demo(&client, events)
    })
    .await
    .context("demo client panicked")??;

    info!(
        events = summary.events,
        objects = summary.objects,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "demo finished"
    );
    Ok(())
}

struct Summary {
    events: u32,
    objects: usize,
    elapsed: std::time::Duration,
}

fn send_demo<W: Write>(client: &ShadowClient<W>, events: u32) -> Result<Summary> {
    let start = Instant::now();

    let point_class = client.load_class("demo/Point", NetReference::NULL, &[], None)?;
    let string_class = client.load_class("java/lang/String", NetReference::NULL, &[], None)?;
    let thread_class = client.load_class("java/lang/Thread", NetReference::NULL, &[], None)?;

    let greeting = client.new_object(string_class)?;
    let main_thread = client.new_object(thread_class)?;
    client.thread_info(main_thread, "main", false)?;

    let on_start = client.register_method("shadowvm.EventLogger.onStart")?;
    let mut event = client.analysis_start(on_start)?;
    event.send_object_plus_data(greeting, ObjectData::String("hello from demo"))?;
    event.send_object(Some(main_thread));
    event.analysis_end()?;

    let on_point = client.register_method("shadowvm.EventCounter.onPoint")?;
    let mut points = Vec::with_capacity(events as usize);
    for i in 0..events {
        let point = client.new_object(point_class)?;
        let mut event = client.analysis_start(on_point)?;
        event.send_object(Some(point));
        event.send_int(i as i32);
        event.send_double(f64::from(i) * 0.5);
        event.analysis_end()?;
        points.push(point);
    }

    client.objects_freed(&points)?;
    client.close()?;

    Ok(Summary {
        events,
        objects: points.len() + 2,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_from_section() {
        let section = ClientSection {
            buffer_size: 4096,
            flush_each_event: true,
            ..Default::default()
        };
        let config = client_config(&section);
        assert_eq!(config.buffer_size, 4096);
        assert!(config.flush_each_event);
        assert_eq!(config.max_message_size, ClientConfig::default().max_message_size);
    }

    #[test]
    fn test_demo_stream_ends_with_close() {
        let client = ShadowClient::new(Vec::new(), ClientConfig::default());
        let summary = send_demo(&client, 3).unwrap();
        assert_eq!(summary.events, 3);
        assert_eq!(summary.objects, 5);

        let bytes = client.into_inner().unwrap();
        assert_eq!(bytes.last(), Some(&0));
    }
}
