#[tokio::main]
async fn main() -> anyhow::Result<()> {
    atc_contact::run().await
}
