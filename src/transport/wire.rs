//! Binary message format exchanged between nodes.
//!
//! ```text
//! b'R' | b'S'   row*        one or more 12-byte rows: join_val, source_id_r, source_id_s
//! b'E'          sender:u32  the sender will not send anything else
//! ```
//!
//! All integers are big-endian. A message is one logical batch; its length is
//! delimited by the transport.

use crate::core::{JoinError, NodeId, Relation, Result, Row};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub const END_OF_STREAM_TAG: u8 = b'E';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Rows { relation: Relation, rows: Vec<Row> },
    EndOfStream { sender: NodeId },
}

pub fn encode_rows(relation: Relation, rows: &[Row]) -> Result<Vec<u8>> {
    if rows.is_empty() {
        return Err(JoinError::Transport(
            "refusing to encode an empty row batch".to_string(),
        ));
    }
    let mut buf = Vec::with_capacity(1 + rows.len() * Row::ENCODED_LEN);
    buf.write_u8(relation.tag())?;
    for row in rows {
        buf.write_u32::<BigEndian>(row.join_val)?;
        buf.write_u32::<BigEndian>(row.source_id_r)?;
        buf.write_u32::<BigEndian>(row.source_id_s)?;
    }
    Ok(buf)
}

pub fn encode_end_of_stream(sender: NodeId) -> Result<Vec<u8>> {
    let sender = u32::try_from(sender)
        .map_err(|_| JoinError::Transport(format!("node id {} does not fit the wire", sender)))?;
    let mut buf = Vec::with_capacity(5);
    buf.write_u8(END_OF_STREAM_TAG)?;
    buf.write_u32::<BigEndian>(sender)?;
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<Message> {
    let Some((&tag, mut body)) = bytes.split_first() else {
        return Err(JoinError::Transport("empty message".to_string()));
    };

    if tag == END_OF_STREAM_TAG {
        if body.len() != 4 {
            return Err(JoinError::Transport(format!(
                "end-of-stream body must be 4 bytes, got {}",
                body.len()
            )));
        }
        let sender = body.read_u32::<BigEndian>()?;
        return Ok(Message::EndOfStream {
            sender: sender as NodeId,
        });
    }

    let relation = Relation::from_tag(tag)?;
    if body.is_empty() || body.len() % Row::ENCODED_LEN != 0 {
        return Err(JoinError::Transport(format!(
            "{} batch body of {} bytes is not a positive multiple of {}",
            relation,
            body.len(),
            Row::ENCODED_LEN
        )));
    }

    let mut rows = Vec::with_capacity(body.len() / Row::ENCODED_LEN);
    while !body.is_empty() {
        let join_val = body.read_u32::<BigEndian>()?;
        let source_id_r = body.read_u32::<BigEndian>()?;
        let source_id_s = body.read_u32::<BigEndian>()?;
        rows.push(Row::new(join_val, source_id_r, source_id_s));
    }
    Ok(Message::Rows { relation, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_batch_layout() {
        let bytes = encode_rows(Relation::S, &[Row::new(1, 0, 258)]).unwrap();
        assert_eq!(bytes, vec![b'S', 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(
            decode(&bytes).unwrap(),
            Message::Rows {
                relation: Relation::S,
                rows: vec![Row::new(1, 0, 258)],
            }
        );
    }

    #[test]
    fn batch_keeps_row_order() {
        let rows: Vec<Row> = (0..5).map(|i| Row::new(10 - i, i, 0)).collect();
        let Message::Rows { relation, rows: decoded } =
            decode(&encode_rows(Relation::R, &rows).unwrap()).unwrap()
        else {
            panic!("expected a row batch");
        };
        assert_eq!(relation, Relation::R);
        assert_eq!(decoded, rows);
    }

    #[test]
    fn end_of_stream_marker() {
        let bytes = encode_end_of_stream(3).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Message::EndOfStream { sender: 3 });
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[b'X', 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(decode(&[b'R']).is_err());
        assert!(decode(&[b'R', 0, 0, 0]).is_err());
        assert!(decode(&[b'E', 0, 0]).is_err());
        assert!(encode_rows(Relation::R, &[]).is_err());
    }
}
