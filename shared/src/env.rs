use dotenv::dotenv;

pub fn init() {
    // Missing .env is fine, environment variables still apply.
    _ = dotenv();
}
