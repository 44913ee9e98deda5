use std::collections::VecDeque;

use bytes::Bytes;
use gbn_lab_abstract::packet::{create_ack_packet, create_data_packet, is_corrupt};
use gbn_lab_abstract::{ConfigError, Entity, HostConfig, NO_ACK, NetworkContext, Packet, ReliableHost};

use crate::window::UnackedRing;

/// A Go-Back-N endpoint acting as sender and receiver on one connection.
///
/// Sender side: up to `window_size` data frames may be outstanding. Payloads
/// arriving while the window is full wait in an unbounded FIFO. Acks are
/// cumulative and a timeout resends the whole outstanding window.
///
/// Receiver side: only the next in-order data frame is accepted; everything
/// else, including corrupt frames, is answered with the last ack sent.
#[derive(Debug)]
pub struct GbnHost {
    entity: Entity,
    window_size: u32,
    timer_interval: u64,

    // Sender
    window_base: u32,
    next_seq_num: u32,
    unacked: UnackedRing,
    app_layer_buffer: VecDeque<Bytes>,

    // Receiver
    expected_seq_num: u32,
    last_ack_pkt: Bytes,
}

impl GbnHost {
    pub fn new(entity: Entity, config: HostConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entity,
            window_size: config.window_size,
            timer_interval: config.timer_interval,
            window_base: 0,
            next_seq_num: 0,
            unacked: UnackedRing::new(config.window_size),
            app_layer_buffer: VecDeque::new(),
            expected_seq_num: 0,
            last_ack_pkt: create_ack_packet(NO_ACK),
        })
    }

    pub fn window_base(&self) -> u32 {
        self.window_base
    }

    pub fn next_seq_num(&self) -> u32 {
        self.next_seq_num
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn expected_seq_num(&self) -> u32 {
        self.expected_seq_num
    }

    /// Number of payloads waiting for window space.
    pub fn buffered(&self) -> usize {
        self.app_layer_buffer.len()
    }

    /// The ack frame resent on corrupt or out-of-order input.
    pub fn last_ack(&self) -> &Bytes {
        &self.last_ack_pkt
    }

    fn has_capacity(&self) -> bool {
        u64::from(self.next_seq_num) < u64::from(self.window_base) + u64::from(self.window_size)
    }

    /// Frame, remember and transmit `payload` as `next_seq_num`.
    /// The caller has checked the window has capacity.
    fn send_data(&mut self, ctx: &mut dyn NetworkContext, payload: &[u8]) {
        let seq_num = self.next_seq_num;
        let frame = create_data_packet(seq_num, payload);
        self.unacked.store(seq_num, frame.clone());
        ctx.log(&format!("GBN send seq={} ({} bytes)", seq_num, payload.len()));
        ctx.pass_to_network_layer(self.entity, frame);

        if self.window_base == seq_num {
            ctx.start_timer(self.entity, self.timer_interval);
        }
        self.next_seq_num += 1;
    }

    fn handle_data(&mut self, ctx: &mut dyn NetworkContext, seq_num: u32, payload: Bytes) {
        if seq_num != self.expected_seq_num {
            ctx.log(&format!(
                "GBN unexpected seq {} (expect {}), re-ACK",
                seq_num, self.expected_seq_num
            ));
            self.resend_last_ack(ctx);
            return;
        }

        ctx.log(&format!("GBN received seq {} ({} bytes)", seq_num, payload.len()));
        ctx.pass_to_application_layer(self.entity, payload);
        self.last_ack_pkt = create_ack_packet(self.expected_seq_num);
        ctx.pass_to_network_layer(self.entity, self.last_ack_pkt.clone());
        self.expected_seq_num += 1;
        ctx.record_metric("expected_seq_num", f64::from(self.expected_seq_num));
    }

    fn handle_ack(&mut self, ctx: &mut dyn NetworkContext, ack: u32) {
        // Sentinel and stale acks leave the window and timer alone.
        if ack == NO_ACK || ack < self.window_base {
            ctx.log(&format!(
                "GBN ignoring ACK {} (window {}..{})",
                ack, self.window_base, self.next_seq_num
            ));
            return;
        }

        ctx.log(&format!("GBN received ACK for seq {}", ack));
        self.window_base = ack + 1;
        ctx.stop_timer(self.entity);
        if self.window_base != self.next_seq_num {
            ctx.start_timer(self.entity, self.timer_interval);
        }

        while self.has_capacity() {
            let Some(payload) = self.app_layer_buffer.pop_front() else {
                break;
            };
            self.send_data(ctx, &payload);
        }
        self.record_window(ctx);
    }

    fn resend_last_ack(&self, ctx: &mut dyn NetworkContext) {
        ctx.pass_to_network_layer(self.entity, self.last_ack_pkt.clone());
    }

    fn record_window(&self, ctx: &mut dyn NetworkContext) {
        ctx.record_metric("window_base", f64::from(self.window_base));
        ctx.record_metric("next_seq_num", f64::from(self.next_seq_num));
        ctx.record_metric("buffered", self.app_layer_buffer.len() as f64);
    }
}

impl ReliableHost for GbnHost {
    fn entity(&self) -> Entity {
        self.entity
    }

    fn receive_from_application_layer(&mut self, ctx: &mut dyn NetworkContext, payload: Bytes) {
        if self.has_capacity() {
            self.send_data(ctx, &payload);
        } else {
            ctx.log(&format!(
                "GBN window full, buffering {} bytes ({} waiting)",
                payload.len(),
                self.app_layer_buffer.len() + 1
            ));
            self.app_layer_buffer.push_back(payload);
        }
        self.record_window(ctx);
    }

    fn receive_from_network_layer(&mut self, ctx: &mut dyn NetworkContext, frame: Bytes) {
        if is_corrupt(&frame) {
            ctx.log("GBN checksum mismatch, re-ACK");
            self.resend_last_ack(ctx);
            return;
        }

        match Packet::decode(&frame) {
            Ok(Packet::Data {
                seq_num, payload, ..
            }) => self.handle_data(ctx, seq_num, payload),
            Ok(Packet::Ack { seq_num, .. }) => self.handle_ack(ctx, seq_num),
            Err(err) => {
                ctx.log(&format!("GBN undecodable frame ({err}), re-ACK"));
                self.resend_last_ack(ctx);
            }
        }
    }

    fn timer_interrupt(&mut self, ctx: &mut dyn NetworkContext) {
        ctx.log(&format!(
            "GBN timeout, retransmitting seq {}..{}",
            self.window_base, self.next_seq_num
        ));
        ctx.start_timer(self.entity, self.timer_interval);

        for seq_num in self.window_base..self.next_seq_num {
            if let Some(frame) = self.unacked.get(seq_num) {
                ctx.pass_to_network_layer(self.entity, frame.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Deliver(Entity, Bytes),
        Send(Entity, Bytes),
        StartTimer(Entity, u64),
        StopTimer(Entity),
    }

    #[derive(Default)]
    struct RecordingContext {
        calls: Vec<Call>,
    }

    impl RecordingContext {
        fn take(&mut self) -> Vec<Call> {
            std::mem::take(&mut self.calls)
        }
    }

    impl NetworkContext for RecordingContext {
        fn pass_to_application_layer(&mut self, entity: Entity, payload: Bytes) {
            self.calls.push(Call::Deliver(entity, payload));
        }

        fn pass_to_network_layer(&mut self, entity: Entity, frame: Bytes) {
            self.calls.push(Call::Send(entity, frame));
        }

        fn start_timer(&mut self, entity: Entity, interval_ms: u64) {
            self.calls.push(Call::StartTimer(entity, interval_ms));
        }

        fn stop_timer(&mut self, entity: Entity) {
            self.calls.push(Call::StopTimer(entity));
        }

        fn log(&mut self, _message: &str) {}

        fn now(&self) -> u64 {
            0
        }
    }

    const T: u64 = 100;

    fn host(entity: Entity, window_size: u32) -> GbnHost {
        GbnHost::new(
            entity,
            HostConfig {
                window_size,
                timer_interval: T,
            },
        )
        .unwrap()
    }

    fn data(seq: u32, payload: &str) -> Bytes {
        create_data_packet(seq, payload.as_bytes())
    }

    fn send(seq: u32, payload: &str) -> Call {
        Call::Send(Entity::A, data(seq, payload))
    }

    #[test]
    fn rejects_zero_window() {
        let err = GbnHost::new(
            Entity::A,
            HostConfig {
                window_size: 0,
                timer_interval: T,
            },
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyWindow);
    }

    #[test]
    fn initial_last_ack_is_sentinel() {
        let host = host(Entity::B, 4);
        assert_eq!(host.last_ack(), &create_ack_packet(NO_ACK));
        assert_eq!(host.expected_seq_num(), 0);
    }

    #[test]
    fn window_scenario() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 4);

        for i in 0..5 {
            a.receive_from_application_layer(&mut ctx, Bytes::from(format!("P{i}")));
        }
        assert_eq!(
            ctx.take(),
            vec![
                send(0, "P0"),
                Call::StartTimer(Entity::A, T),
                send(1, "P1"),
                send(2, "P2"),
                send(3, "P3"),
            ]
        );
        assert_eq!(a.next_seq_num(), 4);
        assert_eq!(a.buffered(), 1);

        // Cumulative ack for 0 and 1 slides the window and releases P4.
        a.receive_from_network_layer(&mut ctx, create_ack_packet(1));
        assert_eq!(
            ctx.take(),
            vec![
                Call::StopTimer(Entity::A),
                Call::StartTimer(Entity::A, T),
                send(4, "P4"),
            ]
        );
        assert_eq!(a.window_base(), 2);
        assert_eq!(a.next_seq_num(), 5);
        assert_eq!(a.buffered(), 0);

        // Corruption: last ack resent verbatim, nothing else changes.
        let mut corrupted = create_ack_packet(3).to_vec();
        corrupted[5] ^= 0x01;
        a.receive_from_network_layer(&mut ctx, Bytes::from(corrupted));
        assert_eq!(
            ctx.take(),
            vec![Call::Send(Entity::A, create_ack_packet(NO_ACK))]
        );
        assert_eq!(a.window_base(), 2);
        assert_eq!(a.next_seq_num(), 5);

        a.timer_interrupt(&mut ctx);
        assert_eq!(
            ctx.take(),
            vec![
                Call::StartTimer(Entity::A, T),
                send(2, "P2"),
                send(3, "P3"),
                send(4, "P4"),
            ]
        );
    }

    #[test]
    fn out_of_order_data_resends_sentinel_ack() {
        let mut ctx = RecordingContext::default();
        let mut b = host(Entity::B, 4);

        b.receive_from_network_layer(&mut ctx, data(2, "early"));
        assert_eq!(
            ctx.take(),
            vec![Call::Send(Entity::B, create_ack_packet(NO_ACK))]
        );
        assert_eq!(b.expected_seq_num(), 0);
    }

    #[test]
    fn in_order_data_is_delivered_and_acked() {
        let mut ctx = RecordingContext::default();
        let mut b = host(Entity::B, 4);

        b.receive_from_network_layer(&mut ctx, data(0, "first"));
        b.receive_from_network_layer(&mut ctx, data(1, "second"));
        assert_eq!(
            ctx.take(),
            vec![
                Call::Deliver(Entity::B, Bytes::from_static(b"first")),
                Call::Send(Entity::B, create_ack_packet(0)),
                Call::Deliver(Entity::B, Bytes::from_static(b"second")),
                Call::Send(Entity::B, create_ack_packet(1)),
            ]
        );
        assert_eq!(b.expected_seq_num(), 2);

        // Duplicate of an accepted frame gets the latest cumulative ack.
        b.receive_from_network_layer(&mut ctx, data(0, "first"));
        assert_eq!(ctx.take(), vec![Call::Send(Entity::B, create_ack_packet(1))]);
        assert_eq!(b.expected_seq_num(), 2);
    }

    #[test]
    fn corrupt_data_resends_last_real_ack() {
        let mut ctx = RecordingContext::default();
        let mut b = host(Entity::B, 4);
        b.receive_from_network_layer(&mut ctx, data(0, "ok"));
        ctx.take();

        let mut corrupted = data(1, "broken").to_vec();
        corrupted[13] ^= 0x80;
        b.receive_from_network_layer(&mut ctx, Bytes::from(corrupted));
        assert_eq!(ctx.take(), vec![Call::Send(Entity::B, create_ack_packet(0))]);
        assert_eq!(b.expected_seq_num(), 1);
    }

    #[test]
    fn undecodable_frame_is_treated_as_corrupt() {
        let mut ctx = RecordingContext::default();
        let mut b = host(Entity::B, 4);

        // Valid checksum, but payload_length overruns the frame.
        let mut raw = data(0, "abc").to_vec();
        raw[8..12].copy_from_slice(&64u32.to_be_bytes());
        raw[6..8].copy_from_slice(&[0, 0]);
        let checksum = gbn_lab_abstract::packet::compute_checksum(&raw);
        raw[6..8].copy_from_slice(&checksum.to_be_bytes());

        b.receive_from_network_layer(&mut ctx, Bytes::from(raw));
        assert_eq!(
            ctx.take(),
            vec![Call::Send(Entity::B, create_ack_packet(NO_ACK))]
        );
        assert_eq!(b.expected_seq_num(), 0);
    }

    #[test]
    fn stale_and_sentinel_acks_are_ignored() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 4);
        for i in 0..3 {
            a.receive_from_application_layer(&mut ctx, Bytes::from(format!("m{i}")));
        }
        a.receive_from_network_layer(&mut ctx, create_ack_packet(0));
        ctx.take();
        assert_eq!(a.window_base(), 1);

        a.receive_from_network_layer(&mut ctx, create_ack_packet(0));
        a.receive_from_network_layer(&mut ctx, create_ack_packet(NO_ACK));
        assert!(ctx.take().is_empty());
        assert_eq!(a.window_base(), 1);
    }

    #[test]
    fn ack_past_next_seq_num_still_slides_window() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 4);
        a.receive_from_application_layer(&mut ctx, Bytes::from_static(b"only"));
        ctx.take();

        a.receive_from_network_layer(&mut ctx, create_ack_packet(2));
        assert_eq!(
            ctx.take(),
            vec![Call::StopTimer(Entity::A), Call::StartTimer(Entity::A, T)]
        );
        assert_eq!(a.window_base(), 3);
        assert_eq!(a.next_seq_num(), 1);
    }

    #[test]
    fn checksum_valid_unknown_type_resends_last_ack() {
        let mut ctx = RecordingContext::default();
        let mut b = host(Entity::B, 4);
        b.receive_from_network_layer(&mut ctx, data(0, "a"));
        ctx.take();

        let mut raw = create_ack_packet(5).to_vec();
        raw[0..2].copy_from_slice(&7u16.to_be_bytes());
        raw[6..8].copy_from_slice(&[0, 0]);
        let checksum = gbn_lab_abstract::packet::compute_checksum(&raw);
        raw[6..8].copy_from_slice(&checksum.to_be_bytes());

        b.receive_from_network_layer(&mut ctx, Bytes::from(raw));
        assert_eq!(ctx.take(), vec![Call::Send(Entity::B, create_ack_packet(0))]);
        assert_eq!(b.expected_seq_num(), 1);
    }

    #[test]
    fn short_frame_resends_last_ack() {
        let mut ctx = RecordingContext::default();
        let mut b = host(Entity::B, 4);

        // Four bytes summing to 0xffff pass the checksum but hold no header.
        b.receive_from_network_layer(&mut ctx, Bytes::from_static(&[0xff, 0x00, 0x00, 0xff]));
        assert_eq!(
            ctx.take(),
            vec![Call::Send(Entity::B, create_ack_packet(NO_ACK))]
        );
        assert_eq!(b.expected_seq_num(), 0);
    }

    #[test]
    fn full_ack_stops_timer_without_restart() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 4);
        a.receive_from_application_layer(&mut ctx, Bytes::from_static(b"x"));
        a.receive_from_application_layer(&mut ctx, Bytes::from_static(b"y"));
        ctx.take();

        a.receive_from_network_layer(&mut ctx, create_ack_packet(1));
        assert_eq!(ctx.take(), vec![Call::StopTimer(Entity::A)]);
        assert_eq!(a.window_base(), a.next_seq_num());

        // Window is empty again, so the next send arms the timer.
        a.receive_from_application_layer(&mut ctx, Bytes::from_static(b"z"));
        assert_eq!(
            ctx.take(),
            vec![send(2, "z"), Call::StartTimer(Entity::A, T)]
        );
    }

    #[test]
    fn drain_after_full_ack_rearms_timer() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 1);
        a.receive_from_application_layer(&mut ctx, Bytes::from_static(b"a"));
        a.receive_from_application_layer(&mut ctx, Bytes::from_static(b"b"));
        ctx.take();
        assert_eq!(a.buffered(), 1);

        a.receive_from_network_layer(&mut ctx, create_ack_packet(0));
        assert_eq!(
            ctx.take(),
            vec![
                Call::StopTimer(Entity::A),
                send(1, "b"),
                Call::StartTimer(Entity::A, T),
            ]
        );
    }

    #[test]
    fn timeout_with_nothing_outstanding_only_rearms() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 4);
        a.timer_interrupt(&mut ctx);
        assert_eq!(ctx.take(), vec![Call::StartTimer(Entity::A, T)]);
    }

    #[test]
    fn buffered_payloads_drain_in_fifo_order() {
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 2);
        for i in 0..6 {
            a.receive_from_application_layer(&mut ctx, Bytes::from(format!("m{i}")));
        }
        ctx.take();
        assert_eq!(a.buffered(), 4);

        a.receive_from_network_layer(&mut ctx, create_ack_packet(1));
        let sent: Vec<_> = ctx
            .take()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(_, frame) => Some(frame),
                _ => None,
            })
            .collect();
        assert_eq!(sent, vec![data(2, "m2"), data(3, "m3")]);
        assert_eq!(a.buffered(), 2);
    }

    #[test]
    fn window_invariant_holds_under_random_events() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = RecordingContext::default();
        let mut a = host(Entity::A, 3);
        let mut submitted = 0u32;

        for _ in 0..2000 {
            match rng.random_range(0..4) {
                0 => {
                    a.receive_from_application_layer(&mut ctx, Bytes::from(submitted.to_string()));
                    submitted += 1;
                }
                1 if a.next_seq_num() > 0 => {
                    // A well-behaved peer only acks what was sent.
                    let ack = rng.random_range(0..a.next_seq_num());
                    a.receive_from_network_layer(&mut ctx, create_ack_packet(ack));
                }
                1 => {}
                2 => a.timer_interrupt(&mut ctx),
                _ => {
                    let mut frame = create_ack_packet(rng.random()).to_vec();
                    let byte = rng.random_range(0..frame.len());
                    frame[byte] ^= 0x10;
                    a.receive_from_network_layer(&mut ctx, Bytes::from(frame));
                }
            }
            assert!(a.window_base() <= a.next_seq_num());
            assert!(a.next_seq_num() <= a.window_base() + a.window_size());
            assert_eq!(
                a.next_seq_num() as usize + a.buffered(),
                submitted as usize,
                "every payload is either sent or buffered"
            );
            ctx.take();
        }
    }
}
