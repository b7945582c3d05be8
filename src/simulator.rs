use std::time::Duration;

use tracing::debug;

use crate::constants::DEFAULT_REPLY_DELAY_MS;

const COUNTER_CONTRACT: &str = r#"```cairo
// A simple counter contract
#[contract]
mod Counter {
    use super::InternalTrait;

    struct Storage {
        value: felt252,
    }

    #[constructor]
    fn constructor(ref self: ContractState, initial_value: felt252) {
        self.value.write(initial_value);
    }

    #[external(v0)]
    fn get_value(self: @ContractState) -> felt252 {
        self.value.read()
    }

    #[external(v0)]
    fn increment(ref self: ContractState) {
        let value = self.value.read();
        self.value.write(value + 1);
    }

    #[external(v0)]
    fn decrement(ref self: ContractState) {
        let value = self.value.read();
        self.value.write(value - 1);
    }
}
```"#;

/// Stand-in for the assistant backend: waits a fixed delay and answers from a template.
#[derive(Debug, Clone)]
pub struct ResponseSimulator {
    delay: Duration,
}

impl Default for ResponseSimulator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_REPLY_DELAY_MS))
    }
}

impl ResponseSimulator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn compose(input: &str) -> String {
        format!(
            "I received your message: \"{}\". I can help you with Cairo contracts. \
             For example, a simple counter contract looks like this:\n\n{}\n\n\
             How else can I assist you?",
            input, COUNTER_CONTRACT
        )
    }

    pub async fn reply(&self, input: &str) -> String {
        debug!(delay_ms = self.delay.as_millis() as u64, "Simulating assistant reply");
        tokio::time::sleep(self.delay).await;
        Self::compose(input)
    }
}
