mod client;

pub use client::MistralClient;
