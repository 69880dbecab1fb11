use afl::fuzz;
use x3ratchet::RatchetMessage;

fn main() {
    fuzz!(|data: &[u8]| {
        if let Ok(message) = RatchetMessage::from_bytes(data) {
            let _ = message.to_base64();
        }
    });
}
