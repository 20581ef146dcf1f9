//! Smoke client: drives one repair order through its whole lifecycle
//! against a running server and checks every step.

use anyhow::{Result, bail};
use clap::Parser;
use reqwest::Client;
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Base URL of a running bagcraft server.
    #[arg(default_value = "http://localhost:1111")]
    base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();

    let session: Value = client
        .post(format!("{}/api/auth/session", args.base_url))
        .json(&json!({}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let token = session["token"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_default();
    println!("Signed in as {}", session["user"]["email"]);

    let created: Value = client
        .post(format!("{}/api/repairs", args.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "customerName": "Jane Doe",
            "phoneNumber": "555-1111",
            "damage": "torn strap",
            "price": 25.0,
            "deadline": "2024-06-01",
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let id = created["id"].as_str().map(str::to_string).unwrap_or_default();
    println!("Created repair order {id} (sync: {})", created["sync"]);

    let listed = list_repairs(&client, &args.base_url, &token).await?;
    let Some(order) = find_order(&listed, &id) else {
        bail!("created order missing from list");
    };
    if order["status"] != "pending" || order["customerName"] != "Jane Doe" {
        bail!("created order came back wrong: {order}");
    }
    println!("Listed {} repair orders, new order is pending", listed.len());

    let updated: Value = client
        .put(format!("{}/api/repairs/{id}", args.base_url))
        .bearer_auth(&token)
        .json(&json!({ "status": "done" }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("Updated status to done (sync: {})", updated["sync"]);

    let listed = list_repairs(&client, &args.base_url, &token).await?;
    let Some(order) = find_order(&listed, &id) else {
        bail!("updated order missing from list");
    };
    if order["status"] != "done" || order["damage"] != "torn strap" || order["price"] != 25.0 {
        bail!("update touched more than the status: {order}");
    }
    println!("Update changed only the status");

    for round in 1..=2 {
        let response = client
            .delete(format!("{}/api/repairs/{id}", args.base_url))
            .bearer_auth(&token)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("delete round {round} failed: {}", response.status());
        }
    }
    let listed = list_repairs(&client, &args.base_url, &token).await?;
    if find_order(&listed, &id).is_some() {
        bail!("order still listed after delete");
    }
    println!("Deleted twice without error, order is gone");

    println!("Smoke test passed");
    Ok(())
}

async fn list_repairs(client: &Client, base_url: &str, token: &str) -> Result<Vec<Value>> {
    let listed: Value = client
        .get(format!("{base_url}/api/repairs"))
        .bearer_auth(token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(listed.as_array().cloned().unwrap_or_default())
}

fn find_order<'a>(orders: &'a [Value], id: &str) -> Option<&'a Value> {
    orders.iter().find(|order| order["id"] == id)
}
