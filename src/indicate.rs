//! Indication flow control.
//!
//! The stack accepts one indication at a time and refuses the next until the
//! peer confirms. Producers call [`send_or_enqueue`]; the periodic tick calls
//! [`drain_one`], which is the only place entries leave the queue.

use crate::error::{Error, StackError};
use crate::gatt::Characteristic;
use crate::platform::BleStack;
use crate::queue::IndicationQueue;
use crate::session::ConnectionSession;

/// What happened to a produced value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delivery {
    /// Handed to the stack; the transport is now in flight.
    Sent,
    /// Transport busy; value waits in the queue.
    Queued,
    /// Not delivered (no link, stack refusal or full queue).
    Dropped,
}

/// Send `value` now if the transport is free, otherwise queue it.
///
/// A stack that still holds an unconfirmed indication refuses with
/// [`StackError::Busy`]; that counts as an in-flight transport and the value
/// is queued rather than lost.
pub fn send_or_enqueue<B, const N: usize>(
    stack: &mut B,
    session: &mut ConnectionSession,
    queue: &mut IndicationQueue<N>,
    characteristic: Characteristic,
    value: &[u8],
) -> Delivery
where
    B: BleStack + ?Sized,
{
    let Some(connection) = session.connection_handle() else {
        return Delivery::Dropped;
    };

    if !session.indication_in_flight() {
        match transmit(stack, session, connection, characteristic, value) {
            Attempt::Sent => return Delivery::Sent,
            Attempt::Failed => return Delivery::Dropped,
            Attempt::Busy => {}
        }
    }

    match queue.enqueue(characteristic, value) {
        Ok(()) => {
            debug!("indicate: {:?} queued, depth {}", characteristic, queue.depth());
            Delivery::Queued
        }
        Err(e) => {
            error!("indicate: enqueue {:?} failed: {:?}", characteristic, e);
            Delivery::Dropped
        }
    }
}

/// Send the oldest queued indication if the transport is free.
///
/// The entry only leaves the queue once the stack took it or refused it for
/// good; a busy stack leaves it at the head for the next tick.
pub fn drain_one<B, const N: usize>(
    stack: &mut B,
    session: &mut ConnectionSession,
    queue: &mut IndicationQueue<N>,
) -> Option<Delivery>
where
    B: BleStack + ?Sized,
{
    if session.indication_in_flight() {
        return None;
    }
    let connection = session.connection_handle()?;
    let entry = *queue.peek()?;
    debug!("indicate: draining {:?}, {} queued", entry.characteristic, queue.depth());
    let delivery = match transmit(stack, session, connection, entry.characteristic, entry.payload()) {
        Attempt::Busy => return Some(Delivery::Queued),
        Attempt::Sent => Delivery::Sent,
        Attempt::Failed => Delivery::Dropped,
    };
    queue.dequeue();
    Some(delivery)
}

enum Attempt {
    Sent,
    /// The stack still holds an earlier indication.
    Busy,
    Failed,
}

fn transmit<B>(
    stack: &mut B,
    session: &mut ConnectionSession,
    connection: u8,
    characteristic: Characteristic,
    value: &[u8],
) -> Attempt
where
    B: BleStack + ?Sized,
{
    match stack.send_indication(connection, characteristic, value) {
        Ok(()) => {
            session.begin_indication();
            Attempt::Sent
        }
        Err(Error::Stack(StackError::Busy)) => {
            warn!("indicate: stack busy with an earlier {:?} indication", characteristic);
            session.begin_indication();
            Attempt::Busy
        }
        Err(e) => {
            error!("indicate: send {:?} failed: {:?}", characteristic, e);
            Attempt::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{Call, MockPlatform};

    const TEMP: Characteristic = Characteristic::TemperatureMeasurement;
    const BUTTON: Characteristic = Characteristic::ButtonState;

    fn connected() -> ConnectionSession {
        let mut s = ConnectionSession::new();
        s.open(1);
        s
    }

    #[test]
    fn free_transport_sends_immediately() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();

        let d = send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[0, 1, 2, 3, 4]);

        assert_eq!(d, Delivery::Sent);
        assert!(s.indication_in_flight());
        assert!(q.is_empty());
        assert_eq!(p.calls, vec![Call::SendIndication(TEMP, vec![0, 1, 2, 3, 4])]);
    }

    #[test]
    fn busy_transport_queues() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();

        send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[1]);
        let d = send_or_enqueue(&mut p, &mut s, &mut q, BUTTON, &[1]);

        assert_eq!(d, Delivery::Queued);
        assert_eq!(q.depth(), 1);
        assert_eq!(p.indications(), 1);
    }

    #[test]
    fn full_queue_drops() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue<2> = IndicationQueue::new();
        s.begin_indication();

        assert_eq!(send_or_enqueue(&mut p, &mut s, &mut q, BUTTON, &[1]), Delivery::Queued);
        assert_eq!(send_or_enqueue(&mut p, &mut s, &mut q, BUTTON, &[0]), Delivery::Queued);
        assert_eq!(send_or_enqueue(&mut p, &mut s, &mut q, BUTTON, &[1]), Delivery::Dropped);
        assert_eq!(q.depth(), 2);
    }

    #[test]
    fn failed_send_leaves_transport_free() {
        let mut p = MockPlatform::new();
        p.stack_fails = true;
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();

        let d = send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[1]);

        assert_eq!(d, Delivery::Dropped);
        assert!(!s.indication_in_flight());
    }

    #[test]
    fn stack_busy_counts_as_in_flight() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();
        p.indication_busy = true;

        let d = send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[7]);

        assert_eq!(d, Delivery::Queued);
        assert!(s.indication_in_flight());
        assert_eq!(q.peek().map(|e| e.payload()), Some(&[7u8][..]));
    }

    #[test]
    fn drain_keeps_head_while_stack_busy() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();
        q.enqueue(TEMP, &[1]).unwrap();
        q.enqueue(TEMP, &[2]).unwrap();
        p.indication_busy = true;

        assert_eq!(drain_one(&mut p, &mut s, &mut q), Some(Delivery::Queued));
        assert_eq!(q.depth(), 2);

        p.indication_busy = false;
        s.end_indication();
        assert_eq!(drain_one(&mut p, &mut s, &mut q), Some(Delivery::Sent));
        assert_eq!(p.calls.last(), Some(&Call::SendIndication(TEMP, vec![1])));
        assert_eq!(q.depth(), 1);
    }

    #[test]
    fn drain_discards_entry_the_stack_rejects() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();
        q.enqueue(TEMP, &[1]).unwrap();
        p.stack_fails = true;

        assert_eq!(drain_one(&mut p, &mut s, &mut q), Some(Delivery::Dropped));
        assert!(q.is_empty());
        assert!(!s.indication_in_flight());
    }

    #[test]
    fn no_link_no_delivery() {
        let mut p = MockPlatform::new();
        let mut s = ConnectionSession::new();
        let mut q: IndicationQueue = IndicationQueue::new();

        assert_eq!(send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[1]), Delivery::Dropped);
        assert!(p.calls.is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn drain_waits_for_confirmation() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();

        send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[1]);
        send_or_enqueue(&mut p, &mut s, &mut q, TEMP, &[2]);

        assert_eq!(drain_one(&mut p, &mut s, &mut q), None);
        assert_eq!(q.depth(), 1);

        s.end_indication();
        assert_eq!(drain_one(&mut p, &mut s, &mut q), Some(Delivery::Sent));
        assert!(q.is_empty());
        assert!(s.indication_in_flight());
        assert_eq!(p.calls.last(), Some(&Call::SendIndication(TEMP, vec![2])));
    }

    #[test]
    fn drain_sends_one_entry_per_call() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();
        q.enqueue(BUTTON, &[1]).unwrap();
        q.enqueue(BUTTON, &[0]).unwrap();

        drain_one(&mut p, &mut s, &mut q);
        s.end_indication();
        drain_one(&mut p, &mut s, &mut q);

        assert_eq!(
            p.calls,
            vec![
                Call::SendIndication(BUTTON, vec![1]),
                Call::SendIndication(BUTTON, vec![0]),
            ]
        );
    }

    #[test]
    fn drain_on_empty_queue_does_nothing() {
        let mut p = MockPlatform::new();
        let mut s = connected();
        let mut q: IndicationQueue = IndicationQueue::new();

        assert_eq!(drain_one(&mut p, &mut s, &mut q), None);
        assert!(p.calls.is_empty());
    }
}
