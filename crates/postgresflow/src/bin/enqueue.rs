// A minimal manual-testing CLI around the Enqueuer, in the teacher's
// hand-rolled `env::args()` subcommand-dispatch style (no CLI-parsing
// crate, matching the teacher's own `bin/pgflowctl.rs`).

use postgresflow::db;
use postgresflow::enqueue::Enqueuer;
use serde_json::Value;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!(
            "enqueue <ClassName> <queue> <json-attrs>\n\
             \n\
             Inserts one delayed_jobs row in the instance-form handler shape.\n\
             Example: enqueue RegisteredJob default '{{\"id\": 100, \"title\": \"hi\"}}'\n\
             \n\
             Uses DATABASE_URL.\n"
        );
        std::process::exit(2);
    }

    let class_name = &args[1];
    let queue = &args[2];
    let attrs_json = &args[3];

    let attrs: Value = serde_json::from_str(attrs_json)?;
    let Value::Object(map) = attrs else {
        anyhow::bail!("json-attrs must be a JSON object");
    };
    let attrs: Vec<(String, Value)> = map.into_iter().collect();

    let database_url =
        env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;
    let pool = db::make_pool(&database_url).await?;

    let enqueuer = Enqueuer::new(pool);
    let id = enqueuer
        .enqueue(class_name, &attrs, queue, true, "run")
        .await?;

    println!("enqueued job id={id} class={class_name} queue={queue}");
    Ok(())
}
