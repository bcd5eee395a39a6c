//! HelloSequence: an orchestration that greets three cities in order.
//!
//! There is no engine here, so the loop below plays its part: every time the
//! orchestration suspends, the host runs the next `SayHello` activity and
//! raises its result back into the instance as an external event.

use anyhow::Context;
use durable_functions::bindings::{ParameterDescriptor, ParameterType};
use durable_functions::observability::init_logging;
use durable_functions::runtime::{PassOutcome, TaskActivity, TaskOrchestration, run_pass};
use durable_functions::{DurableTaskExtension, DurableTaskOptions, OrchestrationInvocation};

const CITIES: [&str; 3] = ["Tokyo", "Seattle", "London"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = DurableTaskOptions::from_json_str(
        r#"{ "durableTask": { "hubName": "SampleHub", "traceInputsAndOutputs": true } }"#,
    )?;
    if let Err(e) = init_logging(&options.logging) {
        eprintln!("logging not initialized: {e}");
    }

    let ext = DurableTaskExtension::builder(options).build()?;
    let registry = ext
        .function_registry()
        .register(ParameterDescriptor::orchestration("HelloSequence"))
        .register(ParameterDescriptor::activity("SayHello", ParameterType::of::<Option<String>>()))
        .build_result()?;

    let say_hello = ext.activity_shim(
        &registry.activity("SayHello").context("SayHello is registered")?,
        |city: Option<String>| async move { Ok(format!("Hello {}!", city.unwrap_or_default())) },
    )?;

    let orchestration = ext.orchestration_shim(
        &registry.orchestration("HelloSequence").context("HelloSequence is registered")?,
        "hello-1",
        |ctx: OrchestrationInvocation| async move {
            let mut greetings = Vec::new();
            for _ in CITIES {
                let greeting: String = ctx.wait_for_external_event_typed("SayHello").await?;
                if !ctx.is_replaying() {
                    println!("received: {greeting}");
                }
                greetings.push(greeting);
            }
            Ok(greetings)
        },
    )?;

    let mut next_city = CITIES.iter();
    loop {
        match run_pass(&*orchestration, None) {
            PassOutcome::Completed(output) => {
                println!("HelloSequence completed: {}", output.unwrap_or_default());
                break;
            }
            PassOutcome::Failed(e) => return Err(e.into()),
            PassOutcome::Suspended => {
                let Some(city) = next_city.next() else {
                    anyhow::bail!("orchestration is waiting for more activity results");
                };
                let input = serde_json::to_string(&[city])?;
                let result = say_hello.run("hello-1", &input).await?;
                orchestration.raise_event("SayHello", result.as_deref().unwrap_or("null"));
            }
        }
    }
    Ok(())
}
