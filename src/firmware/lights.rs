//! Light-strip controller on the I²C bus. Each request is two ASCII
//! digits, effect then mode.

use embedded_hal::i2c::I2c;

use crate::ui::LightEffects;

pub struct I2cLights<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C: I2c> I2cLights<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }
}

impl<I2C: I2c> LightEffects for I2cLights<I2C> {
    fn request(&mut self, effect: u8, mode: u8) {
        info!("lights: effect {} mode {}", effect as char, mode as char);
        if self.i2c.write(self.addr, &[effect, mode]).is_err() {
            warn!("lights: controller did not ack");
        }
    }
}
