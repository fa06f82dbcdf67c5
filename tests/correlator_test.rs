use proptest::prelude::*;
use ruleplay::evaluation::{
    correlator::{Channel, Correlator},
    protocol::Envelope,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// A permutation of `0..n` for some `n` in `1..max`.
fn reply_order(max: usize) -> impl Strategy<Value = Vec<usize>> {
    (1..max).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #[test]
    fn replies_reach_their_callers_in_any_order(order in reply_order(24)) {
        runtime().block_on(async {
            let (channel, mut endpoint) = Channel::<usize, String>::pair();
            let correlator = Correlator::new(channel);

            let pending: Vec<_> = (0..order.len())
                .map(|i| correlator.submit(i).unwrap())
                .collect();
            let mut requests = Vec::new();
            for _ in 0..order.len() {
                requests.push(endpoint.requests.recv().await.unwrap());
            }

            for &index in &order {
                let request = &requests[index];
                let reply = request.reply(format!("reply-{}", request.payload));
                endpoint.replies.send(reply).unwrap();
            }

            let replies = futures::future::join_all(pending).await;
            for (i, reply) in replies.into_iter().enumerate() {
                assert_eq!(reply.unwrap(), format!("reply-{}", i));
            }
            assert_eq!(correlator.pending_count(), 0);
        });
    }

    #[test]
    fn stray_replies_resolve_nothing(
        order in reply_order(12),
        strays in prop::collection::vec(1_000u64..2_000, 0..8),
    ) {
        runtime().block_on(async {
            let (channel, mut endpoint) = Channel::<usize, usize>::pair();
            let correlator = Correlator::new(channel);

            let pending: Vec<_> = (0..order.len())
                .map(|i| correlator.submit(i).unwrap())
                .collect();
            let mut requests = Vec::new();
            for _ in 0..order.len() {
                requests.push(endpoint.requests.recv().await.unwrap());
            }

            for stray in &strays {
                endpoint.replies.send(Envelope::new(*stray, usize::MAX)).unwrap();
            }
            for &index in &order {
                let request = &requests[index];
                endpoint.replies.send(request.reply(request.payload * 10)).unwrap();
            }

            let replies = futures::future::join_all(pending).await;
            for (i, reply) in replies.into_iter().enumerate() {
                assert_eq!(reply.unwrap(), i * 10);
            }
            assert_eq!(correlator.pending_count(), 0);
        });
    }
}
