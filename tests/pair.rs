use bufconn::pair;
use rand::Rng;
use std::io::{Read, Write};
use std::thread;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    data
}

#[test]
fn endpoints_are_connected() {
    let (c1, c2) = pair::new().unwrap();
    assert_eq!(c1.peer_addr().unwrap(), c2.local_addr().unwrap());
    assert_eq!(c2.peer_addr().unwrap(), c1.local_addr().unwrap());

    let data = random_bytes(512);
    (&c1).write_all(&data).unwrap();

    let mut read = vec![0u8; 512];
    (&c2).read_exact(&mut read).unwrap();
    assert_eq!(read, data);

    pair::cleanup(&[&c1, &c2]).unwrap();
}

#[test]
fn duplex_transfers_do_not_deadlock() {
    let (c1, c2) = pair::new().unwrap();
    let data = random_bytes(512);

    let peer = {
        let data = data.clone();
        thread::spawn(move || {
            (&c2).write_all(&data).unwrap();
            let mut read = vec![0u8; 512];
            (&c2).read_exact(&mut read).unwrap();
            (c2, read)
        })
    };

    (&c1).write_all(&data).unwrap();
    let mut read = vec![0u8; 512];
    (&c1).read_exact(&mut read).unwrap();
    assert_eq!(read, data);

    let (c2, peer_read) = peer.join().unwrap();
    assert_eq!(peer_read, data);

    pair::cleanup(&[&c1, &c2]).unwrap();
}
