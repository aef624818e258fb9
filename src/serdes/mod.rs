/*!
    packet protocol on the fifo fabric between the motherboard and its modules

    every exchange is a packet made of a [SerdesHeader] and at most [MAX_PAYLOAD_WORDS] payload words. Register accesses are request/response rounds, one in flight per requester/completer pair:

    - the requester waits for its transmit fifo to drain, pushes the request and flags it ready
    - the completer serves it against its registers and answers with the same header, acknowledged, carrying a status
    - the requester waits for the answer, reads the header then exactly the words it announces, and releases the receive fifo

    block accesses larger than one packet are cut in chunks addressed at `offset + index * MAX_PAYLOAD_WORDS * stride`
*/

/// register names of the fifo hardware
pub mod fifo;
/// packet header layout
mod header;
/// raw packet transmission and reception
mod exchange;
/// register accesses from the requester side
mod accessing;
/// register accesses from the completer side
mod completer;


pub use header::*;
pub use completer::serve_register;
