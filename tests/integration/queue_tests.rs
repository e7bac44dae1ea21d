//! Bounded waits on the task inboxes, linked the way the firmware binary
//! links them.

use std::time::{Duration, Instant};

use brewbrick::app::commands::{ActuatorCommand, CommsRequest};
use brewbrick::app::ports::Outbox;
use brewbrick::channels;
use brewbrick::error::QueueError;
use brewbrick::queue::{NO_WAIT, Queue};

#[test]
fn empty_inbox_wait_expires() {
    let inbox: Queue<CommsRequest, { channels::COMMS_CAPACITY }> = Queue::new("comms");
    let start = Instant::now();
    assert_eq!(inbox.receive(channels::COMMS_WAIT), None);
    assert!(start.elapsed() >= channels::COMMS_WAIT - Duration::from_millis(5));
}

#[test]
fn full_inbox_send_gives_up_and_keeps_the_oldest() {
    let inbox: Queue<ActuatorCommand, { channels::ACTUATORS_CAPACITY }> = Queue::new("actuators");
    for mask in 0..channels::ACTUATORS_CAPACITY as u8 {
        inbox.post(ActuatorCommand::SetBitmask(mask));
    }
    assert_eq!(
        inbox.send(ActuatorCommand::SetBitmask(3), Duration::from_millis(20)),
        Err(QueueError::Full)
    );
    let mut out = &inbox;
    out.deliver(ActuatorCommand::SetBitmask(3));
    assert_eq!(inbox.len(), channels::ACTUATORS_CAPACITY);
    assert_eq!(inbox.receive(NO_WAIT), Some(ActuatorCommand::SetBitmask(0)));
}

#[test]
fn waiting_receiver_gets_a_message_from_another_thread() {
    static INBOX: Queue<CommsRequest, 2> = Queue::new("cross-thread");
    let producer = std::thread::spawn(|| {
        std::thread::sleep(Duration::from_millis(20));
        INBOX.post(CommsRequest::Temperature { value_x10: 187 });
    });
    assert_eq!(
        INBOX.receive(Duration::from_secs(2)),
        Some(CommsRequest::Temperature { value_x10: 187 })
    );
    producer.join().unwrap();
}
