use std::net::SocketAddr;
use std::sync::Arc;

use girder::io::{read_exactly, Connection, Reader, SharedBuffer, Writer};
use girder::net::{connect, Reactor, TcpServerSocket, TcpSocketOptions};
use girder::queue::Queue;
use girder::routine::{block_on, Scheduler};
use girder::Error;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().expect("loopback address")
}

#[test]
fn client_and_server_exchange_bytes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let scheduler = Scheduler::new(2);
    let reactor = Reactor::new().expect("reactor");
    let options = TcpSocketOptions {
        no_delay: true,
        ..TcpSocketOptions::default()
    };
    let server =
        Arc::new(TcpServerSocket::bind(&reactor, loopback(), options).expect("bind"));
    let address = server.local_address();

    let echo = {
        let server = Arc::clone(&server);
        scheduler.spawn(async move {
            let mut channel = server.accept().await.expect("accept");
            let mut request = SharedBuffer::new();
            read_exactly(channel.reader(), &mut request, 4)
                .await
                .expect("request");
            channel
                .writer()
                .write(request.as_slice())
                .await
                .expect("reply");
        })
    };

    block_on(async {
        let mut channel = connect(&reactor, address, &options).await.expect("connect");
        channel.writer().write(b"ping").await.expect("send");
        let mut reply = SharedBuffer::new();
        read_exactly(channel.reader(), &mut reply, 4)
            .await
            .expect("reply");
        assert_eq!(reply.as_slice(), b"ping");
        channel.connection().close().await;
    });
    echo.wait();
    server.close();
    scheduler.shutdown();
    reactor.shutdown();
}

#[test]
fn server_close_unblocks_accept() {
    let scheduler = Scheduler::new(2);
    let reactor = Reactor::new().expect("reactor");
    let server = Arc::new(
        TcpServerSocket::bind(&reactor, loopback(), TcpSocketOptions::default())
            .expect("bind"),
    );
    let outcomes = Queue::new();

    let acceptor = {
        let server = Arc::clone(&server);
        let outcomes = Arc::clone(&outcomes);
        scheduler.spawn(async move {
            let outcome = match server.accept().await {
                Err(Error::EndOfFile) => "end of file",
                Ok(_) => "channel",
                Err(_) => "other error",
            };
            outcomes.try_push(outcome).expect("record");
        })
    };
    server.close();
    acceptor.wait();
    assert_eq!(block_on(outcomes.pop()).expect("outcome"), "end of file");
    scheduler.shutdown();
    reactor.shutdown();
}

#[test]
fn closing_the_connection_eofs_the_peer() {
    let scheduler = Scheduler::new(2);
    let reactor = Reactor::new().expect("reactor");
    let server = Arc::new(
        TcpServerSocket::bind(&reactor, loopback(), TcpSocketOptions::default())
            .expect("bind"),
    );
    let address = server.local_address();

    let peer = {
        let server = Arc::clone(&server);
        scheduler.spawn(async move {
            let mut channel = server.accept().await.expect("accept");
            let mut buffer = SharedBuffer::new();
            assert!(matches!(
                channel.reader().read(&mut buffer).await,
                Err(Error::EndOfFile)
            ));
        })
    };

    block_on(async {
        let channel = connect(&reactor, address, &TcpSocketOptions::default())
            .await
            .expect("connect");
        channel.connection().close().await;
        channel.connection().close().await;
        // The closed side fails both directions with the recorded end of
        // file.
        assert!(matches!(
            channel.writer().write(b"x").await,
            Err(Error::EndOfFile)
        ));
    });
    peer.wait();
    server.close();
    scheduler.shutdown();
    reactor.shutdown();
}
