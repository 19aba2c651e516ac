use crate::matrix::Matrix;

use serde::ser::SerializeStruct;
use serde::Deserialize;

impl<T> serde::Serialize for Matrix<T>
where
    T: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Matrix", 3)?;
        state.serialize_field("h", &self.h())?;
        state.serialize_field("w", &self.w())?;
        state.serialize_field("data", self.as_slice())?;
        state.end()
    }
}

impl<'de, T> serde::Deserialize<'de> for Matrix<T>
where
    T: serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct MatrixData<T> {
            h: usize,
            w: usize,
            data: Vec<T>,
        }

        let MatrixData { h, w, data } = MatrixData::deserialize(deserializer)?;

        Matrix::from_vec(h, w, data).map_err(serde::de::Error::custom)
    }
}
