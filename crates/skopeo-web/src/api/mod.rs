pub mod proxy;
pub mod script;

pub async fn health() -> &'static str {
    "ok"
}
