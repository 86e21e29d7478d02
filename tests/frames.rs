use rand::Rng;

use dynabus::frame::{
    self, Frame, FrameError, ErrorFlags, Instruction, Target,
    MAX_ID, MAX_WRITE, STATUS_SIZE,
    };


#[test]
fn random_writes_parse_back() {
    let mut rng = rand::rng();
    for _ in 0 .. 500 {
        let id = rng.random_range(0 ..= MAX_ID);
        let address = rng.random::<u8>();
        let size = rng.random_range(1 ..= MAX_WRITE);
        let data: Vec<u8> = (0 .. size).map(|_| rng.random()).collect();

        let sent = frame::encode_write(Target::Id(id), address, &data).unwrap();
        let parsed = Frame::parse(sent.as_bytes()).unwrap();
        assert_eq!(parsed, sent);
        assert_eq!(parsed.target(), id);
        assert_eq!(parsed.instruction(), Some(Instruction::Write));
        assert_eq!(parsed.params()[0], address);
        assert_eq!(&parsed.params()[1 ..], &data[..]);
        assert_eq!(usize::from(parsed.length()), data.len() + 3);
    }
}

#[test]
fn random_status_decodes() {
    let mut rng = rand::rng();
    for _ in 0 .. 500 {
        let id = rng.random_range(0 ..= MAX_ID);
        let size = rng.random_range(0 .. 64usize);
        let params: Vec<u8> = (0 .. size).map(|_| rng.random()).collect();
        let error = ErrorFlags::from(rng.random::<u8>() & 0x7f);

        let answer = Frame::status(id, error, &params).unwrap();
        let status = frame::decode_status(answer.as_bytes(), STATUS_SIZE + size).unwrap();
        assert_eq!(status.target, id);
        assert_eq!(status.error, error);
        assert_eq!(&status.params[..], &params[..]);

        // any corrupted byte past the header is caught by the checksum
        let mut corrupted = answer.as_bytes().to_vec();
        let index = rng.random_range(2 .. corrupted.len());
        corrupted[index] = corrupted[index].wrapping_add(rng.random_range(1 ..= 255));
        assert!(matches!(
            frame::decode_status(&corrupted, corrupted.len()),
            Err(FrameError::ChecksumMismatch {..}),
            ));
    }
}
