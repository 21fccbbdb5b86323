//! Calculator server and client over the in-process network.
//!
//! Run with `RUST_LOG=debug` to watch dispatch, registry updates and the
//! middleware logs.

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wirecall::handler::{HandlerEntry, HandlerMap, LogErrors, TimeCalls, UpdateMode};
use wirecall::transport::LocalNetwork;
use wirecall::{params, Client, Fault, HostValue, MulticallRequest, Server};

/// Port the calculator listens on.
const PORT: u16 = 8080;

fn operands(params: &[HostValue]) -> wirecall::Result<(f64, f64)> {
    match params {
        [a, b] => Ok((f64::try_from(a.clone())?, f64::try_from(b.clone())?)),
        _ => Err(Fault::new(-32602, format!("expected 2 operands, got {}", params.len())).into()),
    }
}

fn calculator() -> HandlerMap {
    let mut map = HandlerMap::new();
    map.insert(
        "calc.add".to_string(),
        HandlerEntry::from_sync(|p| operands(&p).map(|(a, b)| HostValue::from(a + b)))
            .doc("Sum of two numbers.")
            .signature(["double", "double", "double"]),
    );
    map.insert(
        "calc.div".to_string(),
        HandlerEntry::from_sync(|p| {
            let (a, b) = operands(&p)?;
            if b == 0.0 {
                return Err(Fault::new(1, "division by zero").into());
            }
            Ok(HostValue::from(a / b))
        })
        .doc("Quotient of two numbers.")
        .signature(["double", "double", "double"]),
    );
    map
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wirecall=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let network = LocalNetwork::new();
    let server = Server::builder()
        .port(PORT)
        .handlers(calculator())
        .middleware(LogErrors)
        .middleware(TimeCalls)
        .start(&network)
        .await?;

    let client = Client::builder(server.endpoint())
        .transport(network.clone())
        .reply_timeout(Duration::from_secs(2))
        .build()?;

    println!("methods: {:?}", client.list_methods().await?);
    println!("calc.add(1.5, 2) = {:?}", client.call("calc.add", &params![1.5, 2]).await?);

    match client.call("calc.div", &params![1, 0]).await {
        Ok(v) => println!("calc.div(1, 0) = {:?}", v),
        Err(e) => println!("calc.div(1, 0) failed: {}", e),
    }

    let batch = [
        MulticallRequest::new("calc.add").arg(1).arg(2),
        MulticallRequest::new("calc.div").arg(1).arg(0),
        MulticallRequest::new("calc.div").arg(9).arg(3),
    ];
    for (i, outcome) in client.multicall_results(&batch).await?.iter().enumerate() {
        println!("batch[{}] = {:?}", i, outcome);
    }

    // Hot reload: add a method while the server runs
    let mut extra = HandlerMap::new();
    extra.insert(
        "calc.mul".to_string(),
        HandlerEntry::from_sync(|p| operands(&p).map(|(a, b)| HostValue::from(a * b))),
    );
    server.update_handlers(extra, UpdateMode::Merge);
    println!("calc.mul(6, 7) = {:?}", client.call("calc.mul", &params![6, 7]).await?);

    server.shutdown().await?;
    Ok(())
}
