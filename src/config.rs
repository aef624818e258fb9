/*!
    runtime settings of both links

    every bound of the protocol lives here, defaults are the values the instrument firmware runs with
*/

use core::time::Duration;


/// timeouts and switches for the uart link and the fifo fabric
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// overall wait for a slave cpu answer on the uart link
    pub slave_response_timeout: Duration,
    /// silence on the uart line that ends a frame
    pub uart_idle_timeout: Duration,
    /// wait for the transmit fifo to drain before writing a packet
    pub tx_empty_timeout: Duration,
    /// wait for the receive fifo to signal a complete packet
    pub rx_ready_timeout: Duration,
    /// wait for a `REQUEST_FINISHED` message after a write, erase or configuration
    pub completion_timeout: Duration,
    /// wait for every module slot to report its base address at startup
    pub detect_modules_timeout: Duration,
    /// bounded acquisition of the per-slot lock
    pub slot_lock_timeout: Duration,
    /// serialize accesses to the same slot from concurrent callers
    pub use_slot_locks: bool,
    /// check the crc-32 of every reassembled message
    pub verify_message_crc: bool,
    /// largest payload sent or requested in one message, bigger transfers are split
    pub max_message_bytes: usize,
    /// most messages reassembled at the same time by one receive loop
    pub max_messages_in_flight: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slave_response_timeout: Duration::from_millis(3000),
            uart_idle_timeout: Duration::from_millis(5),
            tx_empty_timeout: Duration::from_millis(100),
            rx_ready_timeout: Duration::from_millis(1000),
            completion_timeout: Duration::from_millis(30_000),
            detect_modules_timeout: Duration::from_millis(2000),
            slot_lock_timeout: Duration::from_millis(4000),
            use_slot_locks: true,
            verify_message_crc: true,
            max_message_bytes: 16 * 1024,
            max_messages_in_flight: 16,
        }
    }
}

impl Config {
    pub fn with_slave_response_timeout(mut self, timeout: Duration) -> Self {
        self.slave_response_timeout = timeout;
        self
    }
    pub fn with_uart_idle_timeout(mut self, timeout: Duration) -> Self {
        self.uart_idle_timeout = timeout;
        self
    }
    pub fn with_tx_empty_timeout(mut self, timeout: Duration) -> Self {
        self.tx_empty_timeout = timeout;
        self
    }
    pub fn with_rx_ready_timeout(mut self, timeout: Duration) -> Self {
        self.rx_ready_timeout = timeout;
        self
    }
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }
    pub fn with_detect_modules_timeout(mut self, timeout: Duration) -> Self {
        self.detect_modules_timeout = timeout;
        self
    }
    pub fn with_slot_lock_timeout(mut self, timeout: Duration) -> Self {
        self.slot_lock_timeout = timeout;
        self
    }
    pub fn with_slot_locks(mut self, enabled: bool) -> Self {
        self.use_slot_locks = enabled;
        self
    }
    pub fn with_message_crc(mut self, enabled: bool) -> Self {
        self.verify_message_crc = enabled;
        self
    }
    pub fn with_max_message_bytes(mut self, size: usize) -> Self {
        // a message must at least carry one word
        self.max_message_bytes = size.max(4);
        self
    }
    pub fn with_max_messages_in_flight(mut self, count: usize) -> Self {
        self.max_messages_in_flight = count.max(1);
        self
    }
}
