//! Local scripted conversation synthesis
//!
//! Classifies the prompt into payment and call intents by keyword
//! presence, extracts a monetary amount and a recipient name, and unrolls
//! a fixed narrative skeleton. Every step is deterministic given the
//! prompt except the transaction id and phone number, which come from the
//! generator's rng; tests pin them through a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde_json::json;
use std::sync::Mutex;

use shared_types::{AgentRole, AgentStep};

const DEFAULT_AMOUNT: &str = "$50";
const DEFAULT_RECIPIENT: &str = "John";

#[derive(Debug)]
pub struct ScriptedGenerator {
    rng: Mutex<StdRng>,
    payment_re: Regex,
    call_re: Regex,
    amount_re: Regex,
    recipient_lead_re: Regex,
    recipient_trail_re: Regex,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic variant for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            payment_re: Regex::new(r"(?i)\b(?:send|pay|transfer|money|payment|venmo)\b")
                .expect("valid payment regex"),
            call_re: Regex::new(r"(?i)\b(?:call|phone|contact|speak|talk|confirm|ask)\b")
                .expect("valid call regex"),
            amount_re: Regex::new(r"\$\d+(?:\.\d{1,2})?").expect("valid amount regex"),
            recipient_lead_re: Regex::new(r"\b(?i:to|send|pay|call)\b\s+([A-Z][a-z]+)")
                .expect("valid recipient regex"),
            recipient_trail_re: Regex::new(r"([A-Z][a-z]+)\s+(?i:via|and)\b")
                .expect("valid recipient regex"),
        }
    }

    pub fn generate(&self, prompt: &str) -> Vec<AgentStep> {
        let wants_payment = prompt.contains('$') || self.payment_re.is_match(prompt);
        let wants_call = self.call_re.is_match(prompt);
        let amount = self.extract_amount(prompt);
        let recipient = self.extract_recipient(prompt);

        let mut steps = Vec::new();
        steps.push(AgentStep::new(
            AgentRole::Supervisor,
            format!("Received new task: \"{prompt}\". Analyzing intent and requirements."),
            "analysis",
        ));
        steps.push(AgentStep::new(
            AgentRole::Supervisor,
            self.planning_message(wants_payment, wants_call, &amount, &recipient),
            "planning",
        ));

        if wants_payment {
            self.push_payment_flow(&mut steps, &amount, &recipient);
        }
        if wants_payment && wants_call {
            steps.push(AgentStep::new(
                AgentRole::Supervisor,
                format!("Payment confirmed. Bringing in the phone agent to follow up with {recipient}."),
                "progress",
            ));
        }
        if wants_call {
            self.push_call_flow(&mut steps, prompt, wants_payment, &amount, &recipient);
        }

        let mut summary = String::from("Task completed successfully!");
        if wants_payment {
            summary.push_str(&format!("\n- {amount} sent to {recipient} via Venmo ✅"));
        }
        if wants_call {
            summary.push_str(&format!("\n- Phone call with {recipient} completed ✅"));
        }
        steps.push(AgentStep::new(AgentRole::Supervisor, summary, "completion"));

        steps
    }

    fn planning_message(
        &self,
        wants_payment: bool,
        wants_call: bool,
        amount: &str,
        recipient: &str,
    ) -> String {
        let mut planned = Vec::new();
        if wants_payment {
            planned.push(format!("send {amount} to {recipient} via Venmo"));
        }
        if wants_call {
            planned.push(format!("call {recipient} by phone"));
        }
        if planned.is_empty() {
            "No delegable sub-tasks detected. Handling this directly.".to_string()
        } else {
            format!("Task breakdown ready: {}.", planned.join(", then "))
        }
    }

    fn push_payment_flow(&self, steps: &mut Vec<AgentStep>, amount: &str, recipient: &str) {
        let transaction_id = self.next_transaction_id();
        steps.push(AgentStep::new(
            AgentRole::Supervisor,
            format!("Delegating to the Venmo agent: send {amount} to {recipient}."),
            "delegation",
        ));
        steps.push(AgentStep::new(
            AgentRole::Venmo,
            format!("Payment task received. Preparing a transfer of {amount} to {recipient}."),
            "acknowledgment",
        ));
        steps.push(AgentStep::new(
            AgentRole::Venmo,
            format!("Looking up {recipient} in your Venmo contacts."),
            "processing",
        ));
        steps.push(AgentStep::new(
            AgentRole::Venmo,
            format!("Contact verified. Setting the payment amount to {amount}."),
            "processing",
        ));
        steps.push(AgentStep::new(
            AgentRole::Venmo,
            format!("Initiating the transfer: {amount} to {recipient}."),
            "action",
        ));
        steps.push(
            AgentStep::new(
                AgentRole::Venmo,
                format!("Payment sent! Transaction ID: {transaction_id}."),
                "success",
            )
            .with_metadata(json!({
                "transactionId": transaction_id,
                "amount": amount,
                "recipient": recipient,
            })),
        );
    }

    fn push_call_flow(
        &self,
        steps: &mut Vec<AgentStep>,
        prompt: &str,
        wants_payment: bool,
        amount: &str,
        recipient: &str,
    ) {
        let phone_number = self.next_phone_number();
        steps.push(AgentStep::new(
            AgentRole::Phone,
            format!("Call task received. Preparing to contact {recipient}."),
            "acknowledgment",
        ));
        steps.push(AgentStep::new(
            AgentRole::Phone,
            format!("Retrieving the phone number for {recipient}."),
            "processing",
        ));
        steps.push(
            AgentStep::new(
                AgentRole::Phone,
                format!("Found {phone_number}. Dialing now."),
                "action",
            )
            .with_metadata(json!({ "phoneNumber": phone_number })),
        );
        steps.push(AgentStep::new(
            AgentRole::Phone,
            format!("Ringing {recipient}..."),
            "progress",
        ));
        steps.push(AgentStep::new(
            AgentRole::Phone,
            format!("Call connected. Speaking with {recipient}."),
            "progress",
        ));
        steps.push(AgentStep::new(
            AgentRole::Phone,
            format!("Relaying your request to {recipient}."),
            "action",
        ));
        let outcome = if wants_payment {
            format!("{recipient} confirmed the {amount} payment came through. Wrapping up the call.")
        } else {
            format!("{recipient} heard the request \"{prompt}\" and will take care of it. Wrapping up the call.")
        };
        steps.push(AgentStep::new(AgentRole::Phone, outcome, "success"));
    }

    fn extract_amount(&self, prompt: &str) -> String {
        self.amount_re
            .find(prompt)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_AMOUNT.to_string())
    }

    fn extract_recipient(&self, prompt: &str) -> String {
        self.recipient_lead_re
            .captures(prompt)
            .or_else(|| self.recipient_trail_re.captures(prompt))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_RECIPIENT.to_string())
    }

    fn next_transaction_id(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        format!("TXN-{:08X}", rng.random::<u32>())
    }

    fn next_phone_number(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        format!(
            "+1-555-{:03}-{:04}",
            rng.random_range(100..1000u32),
            rng.random_range(0..10000u32)
        )
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}
