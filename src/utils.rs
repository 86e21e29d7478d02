
/**
    implement [packbytes] traits for a [bilge] bitfield, using its underlying integer `$raw`

    servos store multi-byte values little endian, so both encodings go through the integer's own byte conversions
*/
#[macro_export]
macro_rules! pack_bilge {
    ($t:ty, $raw:ty) => {

        impl packbytes::ToBytes for $t {
            type Bytes = [u8; core::mem::size_of::<$raw>()];

            fn to_le_bytes(self) -> Self::Bytes {
                <$raw>::from(self).to_le_bytes()
            }
            fn to_be_bytes(self) -> Self::Bytes {
                <$raw>::from(self).to_be_bytes()
            }
        }
        impl packbytes::FromBytes for $t {
            type Bytes = [u8; core::mem::size_of::<$raw>()];

            fn from_le_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from(<$raw>::from_le_bytes(bytes))
            }
            fn from_be_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from(<$raw>::from_be_bytes(bytes))
            }
        }
    };
}
