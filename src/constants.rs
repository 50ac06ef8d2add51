// Audio parameters of the synthesis payload
pub const SAMPLE_RATE: u32 = 24000; // 24 kHz sample rate
pub const BIT_DEPTH: u16 = 16; // 16 bits per sample
pub const CHANNELS: u16 = 1; // Mono

/// Key under which the API credential is persisted
pub const CREDENTIAL_KEY: &str = "gemini-api-key";
