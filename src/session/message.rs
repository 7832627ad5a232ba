//! Conversions between duplex payloads and caller types

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Error;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    #[inline]
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::decode(err)
    }
}

/// A value that can be sent as a duplex message
pub trait IntoMessage {
    fn into_message(self) -> Message;
}

/// A value that can be read out of a duplex message
pub trait FromMessage: Sized {
    fn from_message(msg: Message) -> Result<Self, Error>;
}

impl IntoMessage for Message {
    #[inline]
    fn into_message(self) -> Message {
        self
    }
}

impl FromMessage for Message {
    #[inline]
    fn from_message(msg: Message) -> Result<Self, Error> {
        Ok(msg)
    }
}

impl IntoMessage for &'static str {
    #[inline]
    fn into_message(self) -> Message {
        Message::text(self)
    }
}

impl IntoMessage for String {
    #[inline]
    fn into_message(self) -> Message {
        Message::text(self)
    }
}

impl FromMessage for String {
    #[inline]
    fn from_message(msg: Message) -> Result<Self, Error> {
        let text = msg.into_text()?;
        Ok(text.as_str().into())
    }
}

impl IntoMessage for Bytes {
    #[inline]
    fn into_message(self) -> Message {
        Message::binary(self)
    }
}

impl FromMessage for Bytes {
    #[inline]
    fn from_message(msg: Message) -> Result<Self, Error> {
        Ok(msg.into_data())
    }
}

impl IntoMessage for Vec<u8> {
    #[inline]
    fn into_message(self) -> Message {
        Message::binary(self)
    }
}

impl FromMessage for Vec<u8> {
    #[inline]
    fn from_message(msg: Message) -> Result<Self, Error> {
        Ok(msg.into_data().into())
    }
}
