#![cfg(feature = "async-tokio")]

use core::convert::Infallible;
use futures::StreamExt;
use ordpool::{PoolConfig, SubmitError, create_pool};
use std::{thread, time::Duration};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_yields_in_submission_order() {
    let compute = |n: u64| {
        thread::sleep(Duration::from_millis(10 - n));
        Ok::<_, Infallible>(n * 10)
    };
    let (mut dispatcher, results) = create_pool(PoolConfig::with_workers(4), compute)
        .unwrap()
        .into_parts();

    let feeder = tokio::task::spawn_blocking(move || {
        for n in 0..10 {
            dispatcher.submit(n).unwrap();
        }
        dispatcher.close().unwrap()
    });

    let values: Vec<_> = results
        .into_stream(2)
        .map(|r| r.unwrap().output.unwrap())
        .collect()
        .await;

    assert_eq!(feeder.await.unwrap(), 10);
    assert_eq!(values, (0..10).map(|n| n * 10).collect::<Vec<_>>());
}

#[tokio::test]
async fn dropped_stream_aborts_the_pool() {
    let compute = |n: u64| Ok::<_, Infallible>(n);
    let (mut dispatcher, results) = create_pool(PoolConfig::with_workers(1).queue_capacity(1), compute)
        .unwrap()
        .into_parts();

    let mut stream = Box::pin(results.into_stream(1));
    let feeder = tokio::task::spawn_blocking(move || {
        let mut n = 0;
        while dispatcher.submit(n).is_ok() {
            n += 1;
        }
    });

    assert!(stream.next().await.unwrap().is_ok());
    drop(stream);
    tokio::time::timeout(Duration::from_secs(5), feeder)
        .await
        .expect("feeder stayed blocked")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_an_idle_stream_closes_the_pool() {
    let compute = |n: u64| Ok::<_, Infallible>(n);
    let (mut dispatcher, results) = create_pool(PoolConfig::with_workers(2), compute)
        .unwrap()
        .into_parts();

    // Nothing was submitted, so the driver is parked waiting for a result.
    let stream = results.into_stream(4);
    drop(stream);

    assert_eq!(dispatcher.try_submit(1), Err(SubmitError::Closed(1)));
    assert_eq!(dispatcher.submit(2), Err(SubmitError::Closed(2)));
    assert_eq!(dispatcher.submitted(), 0);
}
