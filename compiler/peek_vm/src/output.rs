//! Where the debuggee's `println` goes.

use parking_lot::Mutex;

/// Output destination of a VM.
///
/// Enum dispatch; printing happens on every `println` of the program.
#[derive(Default)]
pub enum Output {
    #[default]
    Stdout,
    /// Captures output for tests and for front ends that show it
    /// themselves.
    Buffer(Mutex<String>),
    Silent,
}

impl Output {
    pub fn buffer() -> Self {
        Output::Buffer(Mutex::new(String::new()))
    }

    pub fn println(&self, text: &str) {
        match self {
            Output::Stdout => println!("{text}"),
            Output::Buffer(buffer) => {
                let mut buffer = buffer.lock();
                buffer.push_str(text);
                buffer.push('\n');
            }
            Output::Silent => {}
        }
    }

    /// Everything captured so far; empty unless buffered.
    pub fn captured(&self) -> String {
        match self {
            Output::Buffer(buffer) => buffer.lock().clone(),
            Output::Stdout | Output::Silent => String::new(),
        }
    }

    /// Take the captured output, leaving the buffer empty.
    pub fn take(&self) -> String {
        match self {
            Output::Buffer(buffer) => std::mem::take(&mut *buffer.lock()),
            Output::Stdout | Output::Silent => String::new(),
        }
    }
}
